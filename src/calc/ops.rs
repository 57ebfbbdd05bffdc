//! Pure arithmetic behind the calculation tools.
//!
//! Every operation returns a typed [`Error`] for business-rule failures
//! instead of producing `NaN` or an infinite value.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{Error, Result};

/// Largest integer an IEEE-754 double represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Modulo,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 6] = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::Power,
        BinaryOp::Modulo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::Power => "power",
            BinaryOp::Modulo => "modulo",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "^",
            BinaryOp::Modulo => "%",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Human-readable form of `a op b`, without the result.
    pub fn expression(self, a: f64, b: f64) -> String {
        format!("{} {} {}", format_number(a), self.symbol(), format_number(b))
    }

    pub fn apply(self, a: f64, b: f64) -> Result<f64> {
        let value = match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    return Err(Error::InvalidParams("Division by zero".to_string()));
                }
                a / b
            }
            BinaryOp::Power => a.powf(b),
            BinaryOp::Modulo => {
                if b == 0.0 {
                    return Err(Error::InvalidParams("Division by zero".to_string()));
                }
                a % b
            }
        };
        ensure_safe(value, &self.expression(a, b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancedOp {
    Sqrt,
    Factorial,
    Power,
    Log,
    Abs,
}

impl AdvancedOp {
    pub const ALL: [AdvancedOp; 5] = [
        AdvancedOp::Sqrt,
        AdvancedOp::Factorial,
        AdvancedOp::Power,
        AdvancedOp::Log,
        AdvancedOp::Abs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AdvancedOp::Sqrt => "sqrt",
            AdvancedOp::Factorial => "factorial",
            AdvancedOp::Power => "power",
            AdvancedOp::Log => "log",
            AdvancedOp::Abs => "abs",
        }
    }

    pub fn expression(self, value: f64, exponent: Option<f64>, base: Option<f64>) -> String {
        let v = format_number(value);
        match self {
            AdvancedOp::Sqrt => format!("sqrt({v})"),
            AdvancedOp::Factorial => format!("{v}!"),
            AdvancedOp::Power => match exponent {
                Some(e) => format!("{v} ^ {}", format_number(e)),
                None => format!("{v} ^ ?"),
            },
            AdvancedOp::Log => match base {
                Some(b) => format!("log_{}({v})", format_number(b)),
                None => format!("ln({v})"),
            },
            AdvancedOp::Abs => format!("|{v}|"),
        }
    }

    /// `exponent` is required by [`AdvancedOp::Power`]; `base` is optional for
    /// [`AdvancedOp::Log`] and defaults to e.
    pub fn apply(self, value: f64, exponent: Option<f64>, base: Option<f64>) -> Result<f64> {
        let result = match self {
            AdvancedOp::Sqrt => {
                if value < 0.0 {
                    return Err(Error::InvalidParams(
                        "Cannot take the square root of a negative number".to_string(),
                    ));
                }
                value.sqrt()
            }
            AdvancedOp::Factorial => factorial(value)?,
            AdvancedOp::Power => {
                let exponent = exponent.ok_or_else(|| {
                    Error::InvalidParams("'exponent' is required for power".to_string())
                })?;
                value.powf(exponent)
            }
            AdvancedOp::Log => {
                if value <= 0.0 {
                    return Err(Error::InvalidParams(
                        "Logarithm is only defined for positive numbers".to_string(),
                    ));
                }
                match base {
                    Some(b) if b <= 0.0 || b == 1.0 => {
                        return Err(Error::InvalidParams(
                            "Logarithm base must be positive and not equal to 1".to_string(),
                        ));
                    }
                    Some(b) => value.ln() / b.ln(),
                    None => value.ln(),
                }
            }
            AdvancedOp::Abs => value.abs(),
        };
        ensure_safe(result, &self.expression(value, exponent, base))
    }
}

fn factorial(n: f64) -> Result<f64> {
    if n < 0.0 {
        return Err(Error::InvalidParams(
            "Factorial is not defined for negative numbers".to_string(),
        ));
    }
    if n.fract() != 0.0 {
        return Err(Error::InvalidParams(
            "Factorial is only defined for integers".to_string(),
        ));
    }
    let mut acc = 1.0_f64;
    let mut i = 2.0_f64;
    while i <= n {
        acc *= i;
        if acc > MAX_SAFE_INTEGER {
            break;
        }
        i += 1.0;
    }
    Ok(acc)
}

/// Rejects results that cannot be represented without loss.
pub fn ensure_safe(value: f64, expression: &str) -> Result<f64> {
    if !value.is_finite() || value.abs() > MAX_SAFE_INTEGER {
        return Err(Error::Overflow(format!(
            "Result of {expression} is outside the safe numeric range"
        )));
    }
    Ok(value)
}

/// Formats integral values without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// JSON number that stays an integer when the value is integral.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

pub fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    number_value(*value).serialize(serializer)
}

pub fn serialize_opt_number<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    value.map(number_value).serialize(serializer)
}
