//! Unit-aware quantities
//!
//! A [`Quantity`] is a floating point value tagged with a physical [`Unit`].
//! Values are normalized to internal base units on construction (mm, kg, s,
//! A, K, mol, cd, deg), so `1 cm` and `10 mm` compare equal.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Relative-epsilon float comparison ("essentially equal", Knuth TAOCP 4.2.2).
///
/// Tolerates round-off from unit conversions and repeated arithmetic without
/// admitting genuinely different values.
pub fn essentially_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().min(b.abs())
}

/// True if `a` is indistinguishable from zero under [`essentially_equal`]
pub fn essentially_zero(a: f64) -> bool {
    essentially_equal(a, 0.0)
}

/// Check whether `a` is an integer within a small absolute tolerance,
/// returning the integer if so
pub fn essentially_integer(a: f64) -> Option<i64> {
    let rounded = a.round();
    if (a - rounded).abs() < 1e-9 {
        Some(rounded as i64)
    } else {
        None
    }
}

/// Dimension exponents of a unit
///
/// One signed exponent per base dimension. Angle is carried as its own
/// dimension so that `deg` and dimensionless values do not mix silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitSignature {
    pub length: i8,
    pub mass: i8,
    pub time: i8,
    pub current: i8,
    pub temperature: i8,
    pub amount: i8,
    pub luminous: i8,
    pub angle: i8,
}

impl UnitSignature {
    /// Apply `f` to every exponent
    fn map(self, f: impl Fn(i8) -> i8) -> Self {
        Self {
            length: f(self.length),
            mass: f(self.mass),
            time: f(self.time),
            current: f(self.current),
            temperature: f(self.temperature),
            amount: f(self.amount),
            luminous: f(self.luminous),
            angle: f(self.angle),
        }
    }

    /// Combine two signatures exponent-wise
    fn zip(self, other: Self, f: impl Fn(i8, i8) -> i8) -> Self {
        Self {
            length: f(self.length, other.length),
            mass: f(self.mass, other.mass),
            time: f(self.time, other.time),
            current: f(self.current, other.current),
            temperature: f(self.temperature, other.temperature),
            amount: f(self.amount, other.amount),
            luminous: f(self.luminous, other.luminous),
            angle: f(self.angle, other.angle),
        }
    }

    /// True if every exponent is divisible by `n`
    pub fn divisible_by(&self, n: i8) -> bool {
        self.exponents().iter().all(|e| e % n == 0)
    }

    fn exponents(&self) -> [i8; 8] {
        [
            self.length,
            self.mass,
            self.time,
            self.current,
            self.temperature,
            self.amount,
            self.luminous,
            self.angle,
        ]
    }
}

/// A physical unit, identified by its dimension signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    sig: UnitSignature,
}

/// Base unit symbols, index-aligned with [`UnitSignature::exponents`]
const BASE_SYMBOLS: [&str; 8] = ["mm", "kg", "s", "A", "K", "mol", "cd", "deg"];

/// Named units: symbol, signature constructor, scale to base units
///
/// The table is what the expression tokenizer consults to decide whether an
/// identifier is a unit symbol.
const NAMED_UNITS: &[(&str, Unit, f64)] = &[
    ("nm", Unit::LENGTH, 1e-6),
    ("um", Unit::LENGTH, 1e-3),
    ("mm", Unit::LENGTH, 1.0),
    ("cm", Unit::LENGTH, 10.0),
    ("dm", Unit::LENGTH, 100.0),
    ("m", Unit::LENGTH, 1000.0),
    ("km", Unit::LENGTH, 1e6),
    ("thou", Unit::LENGTH, 0.0254),
    ("in", Unit::LENGTH, 25.4),
    ("ft", Unit::LENGTH, 304.8),
    ("yd", Unit::LENGTH, 914.4),
    ("mg", Unit::MASS, 1e-6),
    ("g", Unit::MASS, 1e-3),
    ("kg", Unit::MASS, 1.0),
    ("t", Unit::MASS, 1000.0),
    ("lb", Unit::MASS, 0.45359237),
    ("ms", Unit::TIME, 1e-3),
    ("s", Unit::TIME, 1.0),
    ("min", Unit::TIME, 60.0),
    ("h", Unit::TIME, 3600.0),
    ("mA", Unit::CURRENT, 1e-3),
    ("A", Unit::CURRENT, 1.0),
    ("K", Unit::TEMPERATURE, 1.0),
    ("mol", Unit::AMOUNT, 1.0),
    ("cd", Unit::LUMINOUS, 1.0),
    ("deg", Unit::ANGLE, 1.0),
    ("rad", Unit::ANGLE, 180.0 / std::f64::consts::PI),
    ("gon", Unit::ANGLE, 0.9),
];

impl Unit {
    /// Dimensionless unit
    pub const NONE: Unit = Unit {
        sig: UnitSignature {
            length: 0,
            mass: 0,
            time: 0,
            current: 0,
            temperature: 0,
            amount: 0,
            luminous: 0,
            angle: 0,
        },
    };

    pub const LENGTH: Unit = Unit::base(0);
    pub const MASS: Unit = Unit::base(1);
    pub const TIME: Unit = Unit::base(2);
    pub const CURRENT: Unit = Unit::base(3);
    pub const TEMPERATURE: Unit = Unit::base(4);
    pub const AMOUNT: Unit = Unit::base(5);
    pub const LUMINOUS: Unit = Unit::base(6);
    pub const ANGLE: Unit = Unit::base(7);

    const fn base(dim: usize) -> Unit {
        let mut sig = UnitSignature {
            length: 0,
            mass: 0,
            time: 0,
            current: 0,
            temperature: 0,
            amount: 0,
            luminous: 0,
            angle: 0,
        };
        match dim {
            0 => sig.length = 1,
            1 => sig.mass = 1,
            2 => sig.time = 1,
            3 => sig.current = 1,
            4 => sig.temperature = 1,
            5 => sig.amount = 1,
            6 => sig.luminous = 1,
            _ => sig.angle = 1,
        }
        Unit { sig }
    }

    /// Create a unit from an explicit signature
    pub fn from_signature(sig: UnitSignature) -> Self {
        Self { sig }
    }

    /// The dimension signature of this unit
    pub fn signature(&self) -> UnitSignature {
        self.sig
    }

    /// True if all exponents are zero
    pub fn is_dimensionless(&self) -> bool {
        self.sig == UnitSignature::default()
    }

    /// Combine by multiplication (exponents add)
    pub fn mul(self, other: Unit) -> Unit {
        Unit {
            sig: self.sig.zip(other.sig, |a, b| a + b),
        }
    }

    /// Combine by division (exponents subtract)
    pub fn div(self, other: Unit) -> Unit {
        Unit {
            sig: self.sig.zip(other.sig, |a, b| a - b),
        }
    }

    /// Raise to an integer power (exponents scale)
    pub fn pow(self, exp: i8) -> Unit {
        Unit {
            sig: self.sig.map(|e| e * exp),
        }
    }

    /// Divide every exponent by `n`; used by the sqrt/cbrt unit rules
    pub fn root(self, n: i8) -> Result<Unit> {
        if !self.sig.divisible_by(n) {
            return Err(Error::IllegalUnit(format!(
                "all dimensions of {} must be divisible by {}",
                self, n
            )));
        }
        Ok(Unit {
            sig: self.sig.map(|e| e / n),
        })
    }

    /// Look up a named unit symbol
    ///
    /// Returns the unit and its scale factor to base units.
    pub fn lookup(symbol: &str) -> Option<(Unit, f64)> {
        NAMED_UNITS
            .iter()
            .find(|(s, _, _)| *s == symbol)
            .map(|(_, u, scale)| (*u, *scale))
    }

    /// True if `symbol` names a known unit
    pub fn is_unit_symbol(symbol: &str) -> bool {
        Self::lookup(symbol).is_some()
    }

    /// Parse a compound unit string such as `mm`, `mm^2` or `mm/s`
    ///
    /// Only the restricted symbol grammar is handled here; full unit
    /// expressions (`1/s`, parenthesized terms) go through the expression
    /// parser instead.
    pub fn parse(text: &str) -> Result<(Unit, f64)> {
        let mut unit = Unit::NONE;
        let mut scale = 1.0;
        let mut rest = text.trim();
        let mut dividing = false;

        while !rest.is_empty() {
            let sym_len = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            if sym_len == 0 {
                return Err(Error::UnknownUnit(text.to_string()));
            }
            let (u, s) =
                Self::lookup(&rest[..sym_len]).ok_or_else(|| Error::UnknownUnit(text.to_string()))?;
            rest = &rest[sym_len..];

            let mut exp: i8 = 1;
            if let Some(r) = rest.strip_prefix('^') {
                let exp_len = r
                    .find(|c: char| !c.is_ascii_digit() && c != '-')
                    .unwrap_or(r.len());
                exp = r[..exp_len]
                    .parse()
                    .map_err(|_| Error::UnknownUnit(text.to_string()))?;
                rest = &r[exp_len..];
            }

            let term = u.pow(exp);
            let term_scale = s.powi(exp as i32);
            if dividing {
                unit = unit.div(term);
                scale /= term_scale;
            } else {
                unit = unit.mul(term);
                scale *= term_scale;
            }

            if let Some(r) = rest.strip_prefix('/') {
                dividing = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('*') {
                dividing = false;
                rest = r;
            } else if !rest.is_empty() {
                return Err(Error::UnknownUnit(text.to_string()));
            }
        }

        Ok((unit, scale))
    }
}

impl fmt::Display for Unit {
    /// Render in base-unit symbols, e.g. `mm^2*kg/s^2`
    ///
    /// The output re-parses through [`Unit::parse`] and the expression
    /// grammar.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exps = self.sig.exponents();
        let mut numer = String::new();
        let mut denom = String::new();
        for (i, &e) in exps.iter().enumerate() {
            if e == 0 {
                continue;
            }
            let (target, mag) = if e > 0 {
                (&mut numer, e)
            } else {
                (&mut denom, -e)
            };
            if !target.is_empty() {
                target.push('*');
            }
            target.push_str(BASE_SYMBOLS[i]);
            if mag != 1 {
                target.push('^');
                target.push_str(&mag.to_string());
            }
        }
        match (numer.is_empty(), denom.is_empty()) {
            (true, true) => Ok(()),
            (false, true) => write!(f, "{}", numer),
            (true, false) => write!(f, "1/{}", denom),
            (false, false) => write!(f, "{}/{}", numer, denom),
        }
    }
}

/// A numeric value tagged with a physical unit
///
/// The value is stored in internal base units; the constructor applies the
/// named-unit scale.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quantity {
    value: f64,
    unit: Unit,
}

impl Quantity {
    /// A dimensionless quantity
    pub fn dimensionless(value: f64) -> Self {
        Self {
            value,
            unit: Unit::NONE,
        }
    }

    /// A quantity already expressed in base units
    pub fn with_unit(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Construct from a value and a unit string, e.g. `Quantity::new(5.0, "mm")`
    pub fn new(value: f64, unit: &str) -> Result<Self> {
        let (unit, scale) = Unit::parse(unit)?;
        Ok(Self {
            value: value * scale,
            unit,
        })
    }

    /// The value in internal base units
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The unit tag
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// True if no dimension is set
    pub fn is_dimensionless(&self) -> bool {
        self.unit.is_dimensionless()
    }

    /// True if dimensionless or carrying exactly the given unit
    pub fn is_dimensionless_or(&self, unit: Unit) -> bool {
        self.is_dimensionless() || self.unit == unit
    }

    /// The value converted to the given named unit, e.g. `q.value_as("cm")`
    pub fn value_as(&self, unit: &str) -> Result<f64> {
        let (u, scale) = Unit::parse(unit)?;
        if u != self.unit {
            return Err(Error::UnitMismatch(self.unit.to_string(), u.to_string()));
        }
        Ok(self.value / scale)
    }

    fn require_same_unit(&self, other: &Quantity) -> Result<()> {
        if self.unit != other.unit {
            return Err(Error::UnitMismatch(
                self.unit.to_string(),
                other.unit.to_string(),
            ));
        }
        Ok(())
    }

    /// Add, requiring equal units
    pub fn add(&self, other: &Quantity) -> Result<Quantity> {
        self.require_same_unit(other)?;
        Ok(Quantity {
            value: self.value + other.value,
            unit: self.unit,
        })
    }

    /// Subtract, requiring equal units
    pub fn sub(&self, other: &Quantity) -> Result<Quantity> {
        self.require_same_unit(other)?;
        Ok(Quantity {
            value: self.value - other.value,
            unit: self.unit,
        })
    }

    /// Multiply; units combine
    pub fn mul(&self, other: &Quantity) -> Quantity {
        Quantity {
            value: self.value * other.value,
            unit: self.unit.mul(other.unit),
        }
    }

    /// Divide; units combine
    pub fn div(&self, other: &Quantity) -> Quantity {
        Quantity {
            value: self.value / other.value,
            unit: self.unit.div(other.unit),
        }
    }

    /// Scale by a plain number
    pub fn scaled(&self, factor: f64) -> Quantity {
        Quantity {
            value: self.value * factor,
            unit: self.unit,
        }
    }

    /// Floating remainder; the unit is the quotient of the operand units
    pub fn rem(&self, other: &Quantity) -> Quantity {
        Quantity {
            value: self.value % other.value,
            unit: self.unit.div(other.unit),
        }
    }

    /// Raise to a power
    ///
    /// The exponent must be dimensionless. If the base carries a unit, the
    /// exponent must be an integer (within tolerance) so the result has a
    /// well-defined signature.
    pub fn pow(&self, exponent: &Quantity) -> Result<Quantity> {
        if !exponent.is_dimensionless() {
            return Err(Error::IllegalUnit(
                "exponent is not allowed to have a unit".into(),
            ));
        }
        let exp = exponent.value;
        if self.is_dimensionless() {
            return Ok(Quantity::dimensionless(self.value.powf(exp)));
        }
        let Some(iexp) = essentially_integer(exp) else {
            return Err(Error::IllegalUnit(
                "exponent must be an integer when used with a unit".into(),
            ));
        };
        Ok(Quantity {
            value: self.value.powf(exp),
            unit: self.unit.pow(iexp as i8),
        })
    }

    /// Compare, requiring equal units; near-equal values compare as equal
    pub fn compare(&self, other: &Quantity) -> Result<Ordering> {
        self.require_same_unit(other)?;
        if essentially_equal(self.value, other.value) {
            Ok(Ordering::Equal)
        } else if self.value < other.value {
            Ok(Ordering::Less)
        } else {
            Ok(Ordering::Greater)
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.unit == other.unit && essentially_equal(self.value, other.value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_dimensionless() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}
