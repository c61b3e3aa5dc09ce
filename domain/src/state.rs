// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Lifecycle State Machine
//!
//! The sidecar's single linear lifecycle:
//! `Boot -> Authorize -> Hydrate -> Decrypt -> Ready`, with `Suspended`
//! reachable from any non-suspended state and absorbing once entered. The
//! gating proxy consults `is_ready()` on every request; `is_suspended()`
//! short-circuits traffic immediately on a billing or authorization failure.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Boot,
    Authorize,
    Hydrate,
    Decrypt,
    Ready,
    Suspended,
}

impl State {
    /// Ordinal along the happy-path sequence; `Suspended` has no ordinal
    /// since it is reachable from anywhere and comparisons against it never
    /// make sense via ordering.
    fn ordinal(self) -> Option<u8> {
        match self {
            State::Boot => Some(0),
            State::Authorize => Some(1),
            State::Hydrate => Some(2),
            State::Decrypt => Some(3),
            State::Ready => Some(4),
            State::Suspended => None,
        }
    }

    /// Whether `self -> next` is a legal single-step transition.
    pub fn can_transition_to(self, next: State) -> bool {
        if next == State::Suspended {
            return self != State::Suspended;
        }
        if self == State::Suspended {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }
}

/// One recorded transition, with the reason for suspensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Thread-safe lifecycle tracker. A single writer drives transitions
/// forward; any number of readers (the gating proxy's middleware, the
/// health-probe surface) consult the current state concurrently.
pub struct StateMachine {
    inner: RwLock<Inner>,
}

struct Inner {
    current: State,
    history: Vec<Transition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                current: State::Boot,
                history: Vec::new(),
            }),
        }
    }

    pub fn current(&self) -> State {
        self.inner.read().expect("state lock poisoned").current
    }

    pub fn is_ready(&self) -> bool {
        self.current() == State::Ready
    }

    pub fn is_suspended(&self) -> bool {
        self.current() == State::Suspended
    }

    /// True once the machine has reached at least `target` along the
    /// happy path. `Suspended` is not comparable to normal states: querying
    /// `is_at_least(Suspended)` is true only when current is itself
    /// `Suspended`, and a suspended machine is never "at least" any normal
    /// state.
    pub fn is_at_least(&self, target: State) -> bool {
        let current = self.current();
        if target == State::Suspended {
            return current == State::Suspended;
        }
        match (current.ordinal(), target.ordinal()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// Advances to `next` along the happy path. Fails if `next` is not the
    /// immediate successor of the current state.
    pub fn advance(&self, next: State, at: DateTime<Utc>) -> Result<()> {
        let mut guard = self.inner.write().expect("state lock poisoned");
        if !guard.current.can_transition_to(next) {
            return Err(SentinelError::InvalidTransition {
                from: format!("{:?}", guard.current),
                to: format!("{next:?}"),
            });
        }
        guard.history.push(Transition {
            from: guard.current,
            to: next,
            at,
            reason: None,
        });
        guard.current = next;
        Ok(())
    }

    /// Suspends the sidecar from any non-suspended state. Idempotent: calling
    /// this while already suspended is a no-op rather than an error, since
    /// callers on multiple error paths may race to suspend concurrently.
    pub fn suspend(&self, reason: impl Into<String>, at: DateTime<Utc>) {
        let mut guard = self.inner.write().expect("state lock poisoned");
        if guard.current == State::Suspended {
            return;
        }
        guard.history.push(Transition {
            from: guard.current,
            to: State::Suspended,
            at,
            reason: Some(reason.into()),
        });
        guard.current = State::Suspended;
    }

    pub fn history(&self) -> Vec<Transition> {
        self.inner.read().expect("state lock poisoned").history.clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
