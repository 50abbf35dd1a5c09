//! Arithmetic for the "whose turn is it" pointer.
//!
//! The pointer is an index into the team's active players in rotation order.
//! The stored value can go stale when the player list shrinks, so every read
//! goes through [`current`], which clamps it with the same modulo rule that
//! [`advance`] uses. A team with no active players has no current player and
//! cannot be advanced.

fn normalize(pointer: i32, active: usize) -> usize {
    (pointer.max(0) as usize) % active
}

/// Index of the current player, or `None` for an empty rotation.
pub fn current(pointer: i32, active: usize) -> Option<usize> {
    if active == 0 {
        return None;
    }
    Some(normalize(pointer, active))
}

/// Next pointer value after a booking or a skip.
pub fn advance(pointer: i32, active: usize) -> Option<i32> {
    let c = current(pointer, active)?;
    Some(((c + 1) % active) as i32)
}

/// Pointer to persist after the player at `removed_at` leaves a rotation of `active_before`.
///
/// Removing someone before the pointer shifts it left so the same person stays
/// current. Removing the current player hands the turn to whoever followed them.
/// An emptied rotation stores 0.
pub fn after_removal(pointer: i32, removed_at: usize, active_before: usize) -> i32 {
    let remaining = active_before.saturating_sub(1);
    if remaining == 0 {
        return 0;
    }
    let c = normalize(pointer, active_before);
    let next = if removed_at < c { c - 1 } else { c % remaining };
    next as i32
}
