//! Instance id generation.

use std::collections::HashSet;
use std::sync::Arc;

use tenantgrid_state::ID_LENGTH;

use crate::error::{Cause, LifecycleError, LifecycleResult};

const MAX_ATTEMPTS: u32 = 64;

/// Source of candidate instance ids. Injectable so tests can force
/// collisions.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Default generator: the first 8 characters of a random UUID.
pub fn random_ids() -> IdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().simple().to_string())
}

/// Draw ids until one is not in `taken`, truncating each to the id length.
pub fn unique_id(generator: &IdGenerator, taken: &HashSet<String>) -> LifecycleResult<String> {
    for _ in 0..MAX_ATTEMPTS {
        let id: String = generator().chars().take(ID_LENGTH).collect();
        if !taken.contains(&id) {
            return Ok(id);
        }
    }
    Err(LifecycleError::new(
        "Reconcile",
        "GenerateId",
        Cause::IdsExhausted {
            attempts: MAX_ATTEMPTS,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sequence(ids: &[&str]) -> IdGenerator {
        let queue = Mutex::new(ids.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        Arc::new(move || {
            let mut q = queue.lock().unwrap();
            if q.len() > 1 { q.remove(0) } else { q[0].clone() }
        })
    }

    #[test]
    fn random_ids_are_eight_chars() {
        let id = unique_id(&random_ids(), &HashSet::new()).unwrap();
        assert_eq!(id.len(), ID_LENGTH);
    }

    #[test]
    fn long_ids_are_truncated() {
        let generator = sequence(&["abcdefghijkl"]);
        assert_eq!(unique_id(&generator, &HashSet::new()).unwrap(), "abcdefgh");
    }

    #[test]
    fn collisions_draw_again() {
        let generator = sequence(&["aaaaaaaa", "bbbbbbbb"]);
        let taken: HashSet<String> = ["aaaaaaaa".to_string()].into();
        assert_eq!(unique_id(&generator, &taken).unwrap(), "bbbbbbbb");
    }

    #[test]
    fn exhausted_generator_errors() {
        let generator = sequence(&["aaaaaaaa"]);
        let taken: HashSet<String> = ["aaaaaaaa".to_string()].into();
        let err = unique_id(&generator, &taken).unwrap_err();
        assert_eq!(err.reason, "GenerateId");
    }
}
