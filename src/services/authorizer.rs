//! Access policy for mutating and signing operations.
//!
//! The gateway itself authenticates nobody. Deployments that need a policy
//! plug one in here; the default allows everything.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Delete,
    Sign,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Upload => "upload",
            Operation::Delete => "delete",
            Operation::Sign => "sign",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

pub trait Authorizer: Send + Sync {
    fn authorize(&self, operation: Operation, key: &str) -> Decision;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _operation: Operation, _key: &str) -> Decision {
        Decision::Allow
    }
}

impl<F> Authorizer for F
where
    F: Fn(Operation, &str) -> Decision + Send + Sync,
{
    fn authorize(&self, operation: Operation, key: &str) -> Decision {
        self(operation, key)
    }
}
