//! Picks the amount a customer actually pays.
//!
//! Incoming payments are identified by nothing but their amount and channel, so each pending order must wait for an
//! amount that no other pending order is waiting for. When the requested amount is taken, the merchant's
//! [`AmountPolicy`] decides whether to nudge it up or down by one cent, or to give up on uniqueness.
//!
//! The search itself is split in two. [`AllocationCursor`] is a pure state machine that decides which candidate to
//! try next. [`AmountAllocator`] drives the cursor against a [`ReservationLedger`], whose atomic insert is the only
//! thing that guarantees exclusivity.
use log::*;

use crate::{
    db_types::{AmountPolicy, Cents, OrderId, PayType},
    traits::ReservationLedger,
    vpe_api::errors::OrderFlowError,
};

pub const DEFAULT_MAX_ALLOCATION_ATTEMPTS: u32 = 10;

/// What the allocator should do after the current candidate turned out to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    /// Try to reserve this amount next.
    Retry(Cents),
    /// Stop searching and use this amount without holding a reservation.
    UseUnreserved(Cents),
    /// No acceptable amount is left to try.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationCursor {
    requested: Cents,
    candidate: Cents,
    attempt: u32,
    max_attempts: u32,
    policy: AmountPolicy,
}

impl AllocationCursor {
    pub fn new(requested: Cents, policy: AmountPolicy, max_attempts: u32) -> Self {
        Self { requested, candidate: requested, attempt: 1, max_attempts: max_attempts.max(1), policy }
    }

    pub fn requested(&self) -> Cents {
        self.requested
    }

    /// The amount the current attempt should try to reserve.
    pub fn candidate(&self) -> Cents {
        self.candidate
    }

    /// The 1-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Moves past a taken candidate.
    pub fn advance(&mut self) -> CursorStep {
        let delta = match self.policy {
            AmountPolicy::None => return CursorStep::UseUnreserved(self.requested),
            AmountPolicy::Increment => Cents::from(1),
            AmountPolicy::Decrement => Cents::from(-1),
        };
        if self.attempt >= self.max_attempts {
            return CursorStep::Exhausted;
        }
        let next = self.candidate + delta;
        if !next.is_positive() {
            return CursorStep::Exhausted;
        }
        self.candidate = next;
        self.attempt += 1;
        CursorStep::Retry(next)
    }
}

/// The outcome of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub amount: Cents,
    /// False only when the `None` policy accepted a collision.
    pub reserved: bool,
    pub attempts: u32,
}

pub struct AmountAllocator<'a, L> {
    ledger: &'a L,
    max_attempts: u32,
}

impl<'a, L> AmountAllocator<'a, L>
where L: ReservationLedger
{
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger, max_attempts: DEFAULT_MAX_ALLOCATION_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Reserves a unique amount near `requested` for `order_id`.
    ///
    /// Returns [`OrderFlowError::CapacityExhausted`] if every candidate the policy allows is taken. Nothing is left
    /// reserved in that case.
    pub async fn allocate(
        &self,
        requested: Cents,
        pay_type: PayType,
        policy: AmountPolicy,
        order_id: &OrderId,
    ) -> Result<Allocation, OrderFlowError> {
        if !requested.is_positive() {
            return Err(OrderFlowError::InvalidPrice(requested.to_string()));
        }
        let mut cursor = AllocationCursor::new(requested, policy, self.max_attempts);
        loop {
            let candidate = cursor.candidate();
            if self.ledger.create_reservation_if_absent(candidate, pay_type, order_id).await? {
                trace!("🔄️💱️ Reserved {candidate} ({pay_type}) for order {order_id} on attempt {}", cursor.attempt());
                return Ok(Allocation { amount: candidate, reserved: true, attempts: cursor.attempt() });
            }
            trace!("🔄️💱️ {candidate} ({pay_type}) is taken. Attempt {} for order {order_id}", cursor.attempt());
            match cursor.advance() {
                CursorStep::Retry(_) => continue,
                CursorStep::UseUnreserved(amount) => {
                    warn!(
                        "🔄️💱️ {amount} ({pay_type}) is already held by another pending order, and the merchant's \
                         amount policy does not allow adjustments. Order {order_id} will share the amount, so an \
                         incoming payment may be matched to the wrong order."
                    );
                    return Ok(Allocation { amount, reserved: false, attempts: cursor.attempt() });
                },
                CursorStep::Exhausted => {
                    warn!(
                        "🔄️💱️ Could not find a free amount near {requested} ({pay_type}) for order {order_id} after {} \
                         attempts",
                        cursor.attempt()
                    );
                    return Err(OrderFlowError::CapacityExhausted(requested, cursor.attempt()));
                },
            }
        }
    }
}
