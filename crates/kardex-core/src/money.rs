//! # Money Module
//!
//! Provides the `Money` and `ExchangeRate` types for handling monetary
//! values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In cost distribution:                                                  │
//! │    $100.00 split 3 ways = $33.33 (×3 = $99.99)  → Lost $0.01!          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    10000 cents / 3 = 3333 cents (×3 = 9999 cents)                      │
//! │    We KNOW we lost 1 cent, and assign it explicitly                    │
//! │    (see the allocation module's largest-remainder rule)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kardex_core::money::Money;
//!
//! // Create from cents (preferred)
//! let price = Money::from_cents(1099); // $10.99
//!
//! // Arithmetic operations
//! let doubled = price * 2;            // $21.98
//! let total = price + Money::from_cents(500); // $15.99
//!
//! // NEVER do this:
//! // let bad = Money::from_float(10.99); // NO SUCH METHOD EXISTS!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds and adjustments
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// The same type carries local-currency and foreign-currency amounts; a
/// foreign amount crosses into local currency only through [`ExchangeRate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use kardex_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    ///
    /// ## Why Cents?
    /// Using the smallest unit eliminates all floating-point concerns.
    /// The database, calculations, and API all use cents.
    /// Only the UI converts to major units for display.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use kardex_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299); // $2.99
    /// let line_total = unit_price.multiply_quantity(3);
    /// assert_eq!(line_total.cents(), 897); // $8.97
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Divides money by a positive quantity, rounding half away from zero.
    ///
    /// Used for per-unit figures (e.g. distributed cost per unit).
    /// The remainder handling for exact distributions lives in the
    /// allocation module; this is the display-grade rounded division.
    ///
    /// ## Example
    /// ```rust
    /// use kardex_core::money::Money;
    ///
    /// let distributed = Money::from_cents(1500); // $15.00 over 5 units
    /// assert_eq!(distributed.div_round(5).cents(), 300); // $3.00/unit
    ///
    /// let odd = Money::from_cents(100); // $1.00 over 3 units
    /// assert_eq!(odd.div_round(3).cents(), 33);
    /// ```
    pub fn div_round(&self, divisor: i64) -> Money {
        assert!(divisor > 0, "divisor must be positive");
        // Widen to i128 so quantity * cents can't overflow mid-division
        let abs = (self.0 as i128).abs();
        let d = divisor as i128;
        let q = (abs * 2 + d) / (d * 2);
        let signed = if self.0 < 0 { -q } else { q };
        Money(signed as i64)
    }
}

// =============================================================================
// Exchange Rate
// =============================================================================

/// Fixed-point scale for [`ExchangeRate`] (1.0 == one million micros).
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Exchange rate in fixed-point micros (1_000_000 = 1.0).
///
/// ## Why Micros?
/// Exchange rates need more precision than cents (e.g. 17.3542 pesos per
/// dollar). Six decimal places in an i64 keeps the whole money path in
/// integer arithmetic, the same policy as [`Money`] itself.
///
/// ## Example
/// ```rust
/// use kardex_core::money::{ExchangeRate, Money};
///
/// let rate = ExchangeRate::from_micros(17_350_000); // 17.35
/// let freight_usd = Money::from_cents(100);         // $1.00
/// assert_eq!(rate.to_local(freight_usd).cents(), 1735); // $17.35 local
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(i64);

impl ExchangeRate {
    /// Creates an exchange rate from micros (1_000_000 = 1.0).
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        ExchangeRate(micros)
    }

    /// Returns the rate in micros.
    #[inline]
    pub const fn micros(&self) -> i64 {
        self.0
    }

    /// Checks whether the rate is usable (strictly positive).
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// Converts a foreign-currency amount to local currency,
    /// rounding half away from zero to whole cents.
    pub fn to_local(&self, foreign: Money) -> Money {
        let product = foreign.cents() as i128 * self.0 as i128;
        Money::from_cents(round_div(product, MICROS_PER_UNIT as i128) as i64)
    }

    /// Converts a local-currency amount back to foreign currency,
    /// rounding half away from zero to whole cents.
    ///
    /// The inverse direction of [`to_local`](Self::to_local): dividing by
    /// the rate instead of multiplying, so mirrored figures stay consistent
    /// under the same rate.
    pub fn to_foreign(&self, local: Money) -> Money {
        let product = local.cents() as i128 * MICROS_PER_UNIT as i128;
        Money::from_cents(round_div(product, self.0 as i128) as i64)
    }
}

/// Integer division rounding half away from zero.
fn round_div(numerator: i128, divisor: i128) -> i128 {
    debug_assert!(divisor > 0);
    let abs = numerator.abs();
    let q = (abs * 2 + divisor) / (divisor * 2);
    if numerator < 0 {
        -q
    } else {
        q
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for debugging and logs. Use frontend formatting for actual UI
/// display to handle localization properly.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.0 / MICROS_PER_UNIT,
            (self.0 % MICROS_PER_UNIT).abs()
        )
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by integer (for quantity calculations).
impl Mul<i32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i32) -> Self {
        Money(self.0 * qty as i64)
    }
}

/// Multiplication by i64.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
