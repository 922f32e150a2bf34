//! Cut sizing for bargain sessions.
//!
//! Each reduction is drawn from a band around the even split of the
//! remaining gap over the remaining steps. The final step always takes
//! the whole remainder so a fully helped session lands exactly on the
//! floor price.

use rand::Rng;

/// Pick the size of the next reduction in cents.
///
/// `remaining_cents` is the gap between the current price and the floor,
/// `remaining_steps` is the number of cuts still permitted including the
/// one being sized. Returns zero when there is nothing left to cut.
pub fn cut_amount<R: Rng>(remaining_cents: i64, remaining_steps: u32, rng: &mut R) -> i64 {
    if remaining_cents <= 0 {
        return 0;
    }

    if remaining_steps <= 1 {
        return remaining_cents;
    }

    let steps = i64::from(remaining_steps);
    let average = remaining_cents / steps;
    let low = (average / 2).max(1);
    let high = (average * 2).min(remaining_cents * 4 / 5).max(low);

    rng.gen_range(low..=high)
}
