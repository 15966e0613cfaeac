//! Minimal cooperative event loop for the non-blocking pacer.
//!
//! An [`EventHandler`] is polled repeatedly and must never wait inside
//! [`EventHandler::action`]. It reports whether it did work, had nothing to do,
//! or is finished and can be removed.

/// Outcome of one call to [`EventHandler::action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Work was done; poll again straight away.
    Busy,
    /// Nothing was due.
    Idle,
    /// The handler is finished and must not be polled again.
    Done,
}

pub trait EventHandler: Send {
    fn action(&mut self) -> Action;
}

/// Handlers are polled this many times between forced yields to the runtime.
const POLLS_PER_YIELD: u32 = 1_024;

/// Poll every handler in turn until all of them report [`Action::Done`].
///
/// The loop busy-polls so that time-critical handlers are not delayed by the
/// runtime's timer resolution. It yields to tokio whenever a full round was idle
/// and periodically otherwise, so other tasks on the same worker still make
/// progress.
pub async fn drive_handlers(mut handlers: Vec<Box<dyn EventHandler>>) {
    tracing::debug!("Driving {} event handlers", handlers.len());
    let mut polls = 0u32;
    while !handlers.is_empty() {
        let mut busy = false;
        handlers.retain_mut(|handler| match handler.action() {
            Action::Busy => {
                busy = true;
                true
            }
            Action::Idle => true,
            Action::Done => false,
        });

        polls = polls.wrapping_add(1);
        if !busy || polls % POLLS_PER_YIELD == 0 {
            tokio::task::yield_now().await;
        }
    }
    tracing::debug!("All event handlers done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    struct Countdown {
        left: u32,
        polled: Arc<AtomicU32>,
    }

    impl EventHandler for Countdown {
        fn action(&mut self) -> Action {
            self.polled.fetch_add(1, Ordering::SeqCst);
            if self.left == 0 {
                return Action::Done;
            }
            self.left -= 1;
            if self.left % 2 == 0 {
                Action::Busy
            } else {
                Action::Idle
            }
        }
    }

    #[tokio::test]
    async fn runs_until_every_handler_is_done() {
        let short = Arc::new(AtomicU32::new(0));
        let long = Arc::new(AtomicU32::new(0));
        drive_handlers(vec![
            Box::new(Countdown {
                left: 3,
                polled: Arc::clone(&short),
            }),
            Box::new(Countdown {
                left: 10,
                polled: Arc::clone(&long),
            }),
        ])
        .await;
        // Done is reported once and the handler is never polled again.
        assert_eq!(short.load(Ordering::SeqCst), 4);
        assert_eq!(long.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn empty_handler_list_returns() {
        drive_handlers(Vec::new()).await;
    }
}
