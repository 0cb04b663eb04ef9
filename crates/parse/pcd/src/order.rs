//! DIMM ordering within an interleave set.
//!
//! The BIOS expects the identification records of an interleave set in a
//! specific order. Two comparators exist: the standard one for 1/2/3/4-way
//! sets and a parity-first one for 6-way sets. Both orderings are part of
//! the platform ABI and must be reproduced exactly.

use core::cmp::Ordering;

/// The topology coordinates that determine a DIMM's interleave position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimmPlacement {
    /// Memory channel id within the memory controller.
    pub channel: u16,
    /// Memory controller (iMC) id within the socket.
    pub controller: u16,
}

/// Standard interleave order: by channel, then by controller, ascending.
///
/// Used for 1-way, 2-way, 3-way and 4-way interleave sets.
#[must_use]
pub fn compare_dimm_order(first: &DimmPlacement, second: &DimmPlacement) -> Ordering {
    first
        .channel
        .cmp(&second.channel)
        .then(first.controller.cmp(&second.controller))
}

/// 6-way interleave order: by `(channel + controller) % 2` parity first,
/// then by channel.
///
/// Produces the sequence the BIOS expects for 6-way sets:
///
/// ```text
/// [CH 0, iMC 0]
/// [CH 1, iMC 1]
/// [CH 2, iMC 0]
/// [CH 0, iMC 1]
/// [CH 1, iMC 0]
/// [CH 2, iMC 1]
/// ```
#[must_use]
pub fn compare_dimm_order_6way(first: &DimmPlacement, second: &DimmPlacement) -> Ordering {
    let first_parity = (first.channel + first.controller) % 2;
    let second_parity = (second.channel + second.controller) % 2;

    first_parity
        .cmp(&second_parity)
        .then(first.channel.cmp(&second.channel))
}
