//! Typed ID definitions for all domain entities.
//!
//! This module defines type aliases for each domain entity, providing
//! compile-time type safety for ID usage throughout the application.

// Re-export the core Id type and version markers
pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Campaign entities.
pub struct Campaign;

/// Marker type for PhoneNumber entities.
pub struct PhoneNumber;

/// Marker type for CallRecord entities.
pub struct CallRecord;

/// Marker type for QueueEntry entities.
pub struct QueueEntry;

/// Marker type for SlotHolding entities.
pub struct SlotHolding;

/// Marker type for DeadLetter entities.
pub struct DeadLetter;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Campaign entities.
pub type CampaignId = Id<Campaign>;

/// Typed ID for PhoneNumber entities.
pub type PhoneNumberId = Id<PhoneNumber>;

/// Typed ID for CallRecord entities. V7 (time-ordered), minted once at
/// admission and carried through every subsequent callback/retry.
pub type CallId = Id<CallRecord>;

/// Typed ID for QueueEntry entities.
pub type QueueEntryId = Id<QueueEntry>;

/// Typed ID for SlotHolding entities.
pub type SlotHoldingId = Id<SlotHolding>;

/// Typed ID for DeadLetter entities.
pub type DeadLetterId = Id<DeadLetter>;
