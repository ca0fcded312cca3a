// src/subscription.rs

//! Closable handles returned by watches and update channels.

/// A live registration that can be torn down.
///
/// `close` must be idempotent: closing an already-closed subscription, or one
/// whose underlying resource has disappeared, is a no-op. Cascading teardown
/// in the recursive watcher relies on this.
pub trait Subscription: Send + Sync {
    fn close(&self);
}
