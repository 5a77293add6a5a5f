// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change-journal channel constants.
//!
//! Every mutation on a [`NodeStore`](crate::node::NodeStore) marks one of
//! these channels (via [`understory_dirty`]) for the mutated node. The
//! journal does not propagate: it only records *which* nodes changed since
//! the last rendered frame.
//!
//! # Consumption
//!
//! At the start of each rendered frame the render pipeline calls
//! [`NodeStore::take_changes`](crate::node::NodeStore::take_changes), which
//! drains every channel. Each drained node then receives
//! [`mark_changed`](crate::node::NodeStore::mark_changed) with the new frame
//! id, which is where ancestor propagation happens. An empty drain means
//! nothing visible changed, which the "skip unchanged frames" policy uses to
//! avoid rendering at all.

use understory_dirty::Channel;

/// Position, pivot, scale, skew, rotation, or 3D part changed.
pub const TRANSFORM: Channel = Channel::new(0);

/// Opacity, blend mode, visibility, touchability, or cacheability changed.
pub const APPEARANCE: Channel = Channel::new(1);

/// Leaf geometry or texture changed, or a redraw was requested externally.
pub const CONTENT: Channel = Channel::new(2);

/// Mask, filter, or clip rect changed.
pub const MASKING: Channel = Channel::new(3);

/// Node created, destroyed, inserted, or removed.
pub const TOPOLOGY: Channel = Channel::new(4);

/// Every channel, in drain order.
pub const ALL: [Channel; 5] = [TRANSFORM, APPEARANCE, CONTENT, MASKING, TOPOLOGY];
