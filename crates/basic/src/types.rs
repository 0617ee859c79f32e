//! Numeric type rules
//!
//! The promotion lattice is Integer -> Long -> Single -> Double; binary
//! operators promote to the wider operand. Integer division (`\`) and
//! `MOD` require integral operands; violations go to an installable
//! error sink and degrade to Long so lowering can continue.

use std::sync::Mutex;

/// Numeric BASIC scalar types, ordered by the promotion lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumericType {
    /// 16-bit signed integer.
    Integer,
    /// 32-bit signed integer.
    Long,
    /// 32-bit IEEE-754 float.
    Single,
    /// 64-bit IEEE-754 float.
    Double,
}

impl NumericType {
    pub fn is_integral(self) -> bool {
        matches!(self, NumericType::Integer | NumericType::Long)
    }
}

/// Structured description of a recoverable numeric type error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError {
    pub code: String,
    pub message: String,
}

type TypeErrorSink = Box<dyn Fn(&TypeError) + Send>;

static SINK: Mutex<Option<TypeErrorSink>> = Mutex::new(None);

pub struct TypeRules;

impl TypeRules {
    /// Result type of a binary numeric operator.
    pub fn result_type(op: &str, lhs: NumericType, rhs: NumericType) -> NumericType {
        let wider = lhs.max(rhs);
        match op {
            "+" | "-" | "*" => wider,
            // Floating-point division always leaves the integral domain.
            "/" => wider.max(NumericType::Single),
            "\\" | "MOD" => {
                if !lhs.is_integral() || !rhs.is_integral() {
                    Self::report(TypeError {
                        code: "B2001".to_string(),
                        message: format!(
                            "operator {op} requires INTEGER or LONG operands"
                        ),
                    });
                }
                NumericType::Long
            }
            "^" => {
                if wider == NumericType::Double {
                    NumericType::Double
                } else {
                    NumericType::Single
                }
            }
            _ => wider,
        }
    }

    /// Result type of a unary operator.
    pub fn unary_result_type(op: char, operand: NumericType) -> NumericType {
        match op {
            '-' | '+' => operand,
            _ => operand,
        }
    }

    /// Install (or clear) the callback receiving recoverable errors.
    pub fn set_type_error_sink(sink: Option<TypeErrorSink>) {
        *SINK.lock().unwrap() = sink;
    }

    fn report(error: TypeError) {
        if let Some(sink) = SINK.lock().unwrap().as_ref() {
            sink(&error);
        } else {
            tracing::warn!(code = %error.code, "{}", error.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn test_promotion_lattice() {
        use NumericType::*;
        assert_eq!(TypeRules::result_type("+", Integer, Long), Long);
        assert_eq!(TypeRules::result_type("+", Long, Single), Single);
        assert_eq!(TypeRules::result_type("-", Single, Double), Double);
        assert_eq!(TypeRules::result_type("*", Integer, Double), Double);
        assert_eq!(TypeRules::result_type("+", Integer, Integer), Integer);
    }

    #[test]
    fn test_division_leaves_integers() {
        use NumericType::*;
        assert_eq!(TypeRules::result_type("/", Integer, Integer), Single);
        assert_eq!(TypeRules::result_type("/", Double, Integer), Double);
    }

    #[test]
    fn test_pow_promotes_to_float() {
        use NumericType::*;
        assert_eq!(TypeRules::result_type("^", Integer, Integer), Single);
        assert_eq!(TypeRules::result_type("^", Double, Integer), Double);
    }

    #[test]
    #[serial]
    fn test_mod_requires_integers() {
        use NumericType::*;
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        TypeRules::set_type_error_sink(Some(Box::new(move |e| {
            sink.lock().unwrap().push(e.clone());
        })));

        assert_eq!(TypeRules::result_type("MOD", Integer, Long), Long);
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(TypeRules::result_type("MOD", Single, Integer), Long);
        assert_eq!(TypeRules::result_type("\\", Integer, Double), Long);
        TypeRules::set_type_error_sink(None);

        let errors = seen.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, "B2001");
    }

    #[test]
    fn test_unary_preserves_type() {
        assert_eq!(
            TypeRules::unary_result_type('-', NumericType::Double),
            NumericType::Double
        );
        assert_eq!(
            TypeRules::unary_result_type('+', NumericType::Integer),
            NumericType::Integer
        );
    }
}
