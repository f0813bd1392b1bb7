//! Subscription authorization seam
//!
//! Whether a principal may join a room is decided outside the hub (guild
//! membership, channel permissions). The read pump asks before subscribing.

use async_trait::async_trait;

use super::connection::Principal;
use super::rooms::RoomId;

#[async_trait]
pub trait RoomPolicy: Send + Sync {
    async fn may_subscribe(&self, principal: &Principal, room: &RoomId) -> bool;
}

/// Admits every subscription
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl RoomPolicy for AllowAll {
    async fn may_subscribe(&self, _principal: &Principal, _room: &RoomId) -> bool {
        true
    }
}
