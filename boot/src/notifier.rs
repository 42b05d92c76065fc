//! Notifier chains: prioritised callbacks for one event type.

use crate::prio::{ListHandle, PriorityList};
use alloc::boxed::Box;

/// What a notifier block reports back to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    /// The event was not of interest.
    Done,
    Ok,
    /// Handled; lower priority blocks are not called.
    Stop,
}

pub trait NotifierBlock<E>: Send + Sync {
    fn notify(&self, event: &E) -> NotifyResult;
}

impl<E, F> NotifierBlock<E> for F
where
    F: Fn(&E) -> NotifyResult + Send + Sync,
{
    fn notify(&self, event: &E) -> NotifyResult {
        self(event)
    }
}

pub struct NotifierChain<E> {
    blocks: PriorityList<Box<dyn NotifierBlock<E>>>,
}

impl<E> Default for NotifierChain<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> NotifierChain<E> {
    pub const fn new() -> NotifierChain<E> {
        NotifierChain {
            blocks: PriorityList::new(),
        }
    }

    pub fn register<B: NotifierBlock<E> + 'static>(
        &mut self,
        name: &str,
        priority: i32,
        block: B,
    ) -> ListHandle {
        self.blocks.register(name, priority, Box::new(block))
    }

    /// Register at `NOTIFIER_DEFAULT_PRIORITY`.
    pub fn register_default<B: NotifierBlock<E> + 'static>(&mut self, name: &str, block: B) -> ListHandle {
        self.register(name, config::NOTIFIER_DEFAULT_PRIORITY as i32, block)
    }

    pub fn unregister(&mut self, handle: ListHandle) -> bool {
        self.blocks.unregister(handle).is_some()
    }

    /// Call the blocks highest priority first until one returns [NotifyResult::Stop].
    ///
    /// Returns the result of the last block called, [NotifyResult::Done] for an empty chain.
    pub fn call_chain(&self, event: &E) -> NotifyResult {
        let mut ret = NotifyResult::Done;
        for entry in self.blocks.iter() {
            ret = entry.item().notify(event);
            if ret == NotifyResult::Stop {
                debug_ex!("Notifier '{}' stopped the chain.", entry.name());
                break;
            }
        }
        ret
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{sync::Arc, vec, vec::Vec};
    use spin::Mutex;

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        result: NotifyResult,
    ) -> impl Fn(&u32) -> NotifyResult + Send + Sync + 'static {
        let log = log.clone();
        move |_| {
            log.lock().push(name);
            result
        }
    }

    #[test]
    fn empty_chain_is_done() {
        let chain: NotifierChain<u32> = NotifierChain::new();
        assert_eq!(chain.call_chain(&1), NotifyResult::Done);
    }

    #[test]
    fn stop_ends_the_walk() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = NotifierChain::new();
        chain.register("low", -5, recorder(&log, "low", NotifyResult::Ok));
        chain.register("high", 10, recorder(&log, "high", NotifyResult::Ok));
        chain.register("mid", 0, recorder(&log, "mid", NotifyResult::Stop));
        assert_eq!(chain.call_chain(&7), NotifyResult::Stop);
        assert_eq!(*log.lock(), vec!["high", "mid"]);
    }

    #[test]
    fn last_result_is_returned() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = NotifierChain::new();
        let first = chain.register_default("a", recorder(&log, "a", NotifyResult::Ok));
        chain.register_default("b", recorder(&log, "b", NotifyResult::Done));
        assert_eq!(chain.call_chain(&0), NotifyResult::Done);
        assert!(chain.unregister(first));
        assert!(!chain.unregister(first));
        log.lock().clear();
        chain.call_chain(&0);
        assert_eq!(*log.lock(), vec!["b"]);
    }
}
