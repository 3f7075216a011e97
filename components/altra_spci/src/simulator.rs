//! Scripted Secure Monitor
//!
//! A [`SecureMonitor`] that returns queued results in order and records every call, for host-based tests of SPCI
//! clients. Once the queue is drained every call succeeds with zeroed result registers.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{collections::VecDeque, vec::Vec};
use core::cell::RefCell;

use altra_sdk::smc::{SecureMonitor, SmcArgs, SmcReturn};

#[derive(Debug, Default)]
pub struct ScriptedSecureMonitor {
    results: RefCell<VecDeque<SmcReturn>>,
    calls: RefCell<Vec<SmcArgs>>,
}

impl ScriptedSecureMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next unanswered call.
    pub fn push_result(&self, result: SmcReturn) {
        self.results.borrow_mut().push_back(result);
    }

    /// Every call observed so far, in order.
    pub fn calls(&self) -> Vec<SmcArgs> {
        self.calls.borrow().clone()
    }
}

impl SecureMonitor for ScriptedSecureMonitor {
    fn call(&self, args: SmcArgs) -> SmcReturn {
        self.calls.borrow_mut().push(args);
        self.results.borrow_mut().pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_are_returned_in_order() {
        let monitor = ScriptedSecureMonitor::new();
        monitor.push_result(SmcReturn::from(-4));
        assert_eq!(monitor.call(SmcArgs::new(1)).status(), -4);
        assert_eq!(monitor.call(SmcArgs::new(2)), SmcReturn::default());
        assert_eq!(monitor.calls().iter().map(|args| args.function_id).collect::<Vec<_>>(), [1, 2]);
    }
}
