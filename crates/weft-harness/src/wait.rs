#![forbid(unsafe_code)]

//! Turn-polling helper.

use thiserror::Error;
use weft_runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("condition still false after {turns} turns")]
    Timeout { turns: usize },

    #[error("runtime went idle after {turns} turns with the condition still false")]
    Idle { turns: usize },
}

/// Run turns until `predicate` holds. Returns the number of turns run.
///
/// # Errors
///
/// [`WaitError::Idle`] if the runtime runs out of work first, or
/// [`WaitError::Timeout`] after `max_turns`.
pub fn wait_for(
    runtime: &mut Runtime,
    max_turns: usize,
    mut predicate: impl FnMut(&Runtime) -> bool,
) -> Result<usize, WaitError> {
    let mut turns = 0;
    loop {
        if predicate(runtime) {
            return Ok(turns);
        }
        if turns >= max_turns {
            return Err(WaitError::Timeout { turns });
        }
        if !runtime.run_turn() {
            return Err(WaitError::Idle { turns });
        }
        turns += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use weft_runtime::{OfflineTransport, RuntimeConfig};

    #[test]
    fn waits_for_scheduled_work() {
        let mut rt = Runtime::new(RuntimeConfig::default(), OfflineTransport);
        let flag = Rc::new(Cell::new(false));
        let set = Rc::clone(&flag);
        rt.schedule(|rt| rt.schedule(move |_| set.set(true)));
        assert_eq!(wait_for(&mut rt, 10, |_| flag.get()), Ok(2));
    }

    #[test]
    fn idle_and_timeout_are_distinguished() {
        let mut rt = Runtime::new(RuntimeConfig::default(), OfflineTransport);
        assert_eq!(wait_for(&mut rt, 10, |_| false), Err(WaitError::Idle { turns: 0 }));

        fn respawn(rt: &mut Runtime) {
            rt.schedule(respawn);
        }
        rt.schedule(respawn);
        assert_eq!(wait_for(&mut rt, 3, |_| false), Err(WaitError::Timeout { turns: 3 }));
    }
}
