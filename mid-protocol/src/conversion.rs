//! Raw to engineering value conversion
//!
//! Formulas come from the collection server as small arithmetic expressions
//! over `x` (the raw value) and `t` (a secondary value, the engineering
//! temperature for humidity channels). They are evaluated in a sandbox that
//! only knows a fixed set of math functions.

use crate::descriptor::ChannelConfig;
use crate::error::{MidError, MidResult};
use chrono::{DateTime, Utc};
use evalexpr::{
    Context, ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError,
    EvalexprResult, Function, HashMapContext, Value,
};
use mid_core::SensorId;
use std::collections::{HashMap, VecDeque};

/// Default number of values kept per smoothed channel
pub const SMOOTHING_WINDOW: usize = 30;

/// Evaluates conversion formulas
#[cfg_attr(test, mockall::automock)]
pub trait FormulaEvaluator: Send + Sync {
    /// Evaluate `formula` with `x` bound to the raw value and `t` to the
    /// secondary value
    fn evaluate(&self, formula: &str, x: f64, t: f64) -> MidResult<f64>;
}

/// Sandboxed evaluator backed by `evalexpr`
///
/// Built-in `evalexpr` functions are disabled; only the whitelisted math
/// functions below, the constants `e` and `pi` and the variables `x` and `t`
/// resolve. `**` is accepted as the power operator. A result that is not a
/// finite number is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeFormulaEvaluator;

type Unary = fn(f64) -> f64;
type Binary = fn(f64, f64) -> f64;

const UNARY_FUNCTIONS: &[(&str, Unary)] = &[
    ("acos", f64::acos),
    ("asin", f64::asin),
    ("atan", f64::atan),
    ("ceil", f64::ceil),
    ("cos", f64::cos),
    ("cosh", f64::cosh),
    ("degrees", f64::to_degrees),
    ("exp", f64::exp),
    ("fabs", f64::abs),
    ("abs", f64::abs),
    ("floor", f64::floor),
    ("log", f64::ln),
    ("log10", f64::log10),
    ("radians", f64::to_radians),
    ("sin", f64::sin),
    ("sinh", f64::sinh),
    ("sqrt", f64::sqrt),
    ("tan", f64::tan),
    ("tanh", f64::tanh),
];

const BINARY_FUNCTIONS: &[(&str, Binary)] = &[
    ("atan2", f64::atan2),
    ("fmod", fmod),
    ("hypot", f64::hypot),
    ("pow", f64::powf),
];

fn fmod(a: f64, b: f64) -> f64 {
    a % b
}

fn to_f64(value: &Value) -> EvalexprResult<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        _ => Err(EvalexprError::expected_number(value.clone())),
    }
}

fn unary(f: Unary) -> Function {
    Function::new(move |argument| Ok(Value::Float(f(to_f64(argument)?))))
}

fn binary(f: Binary) -> Function {
    Function::new(move |argument| {
        let tuple = argument.as_tuple()?;
        if tuple.len() != 2 {
            return Err(EvalexprError::CustomMessage(format!(
                "expected 2 arguments, got {}",
                tuple.len()
            )));
        }
        Ok(Value::Float(f(to_f64(&tuple[0])?, to_f64(&tuple[1])?)))
    })
}

impl SafeFormulaEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn context(x: f64, t: f64) -> EvalexprResult<HashMapContext> {
        let mut context = HashMapContext::new();
        context.set_builtin_functions_disabled(true)?;
        for (name, f) in UNARY_FUNCTIONS {
            context.set_function(name.to_string(), unary(*f))?;
        }
        for (name, f) in BINARY_FUNCTIONS {
            context.set_function(name.to_string(), binary(*f))?;
        }
        context.set_value("e".to_string(), Value::Float(std::f64::consts::E))?;
        context.set_value("pi".to_string(), Value::Float(std::f64::consts::PI))?;
        context.set_value("x".to_string(), Value::Float(x))?;
        context.set_value("t".to_string(), Value::Float(t))?;
        Ok(context)
    }
}

impl FormulaEvaluator for SafeFormulaEvaluator {
    fn evaluate(&self, formula: &str, x: f64, t: f64) -> MidResult<f64> {
        let failed = |cause: String| MidError::FormulaEvaluation {
            formula: formula.to_string(),
            cause,
        };

        let expression = formula.replace("**", "^");
        let context = Self::context(x, t).map_err(|e| failed(e.to_string()))?;
        let value = evalexpr::eval_with_context(&expression, &context)
            .map_err(|e| failed(e.to_string()))?;

        let result = to_f64(&value).map_err(|e| failed(e.to_string()))?;
        if !result.is_finite() {
            return Err(failed(format!("result is not finite ({})", result)));
        }
        Ok(result)
    }
}

/// Moving-average windows keyed by sensor id
///
/// Owned by whoever drives the reading cycles and handed to every conversion,
/// so smoothing state lives exactly as long as its owner.
#[derive(Debug, Clone)]
pub struct SmoothingWindows {
    size: usize,
    windows: HashMap<SensorId, VecDeque<f64>>,
}

impl Default for SmoothingWindows {
    fn default() -> Self {
        Self::new()
    }
}

impl SmoothingWindows {
    pub fn new() -> Self {
        Self::with_size(SMOOTHING_WINDOW)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            size: size.max(1),
            windows: HashMap::new(),
        }
    }

    /// Add a value and return the mean of the window
    pub fn push(&mut self, sensor_id: SensorId, value: f64) -> f64 {
        let window = self.windows.entry(sensor_id).or_default();
        if window.len() == self.size {
            window.pop_front();
        }
        window.push_back(value);
        window.iter().sum::<f64>() / window.len() as f64
    }

    /// Number of values currently held for a sensor
    pub fn len(&self, sensor_id: SensorId) -> usize {
        self.windows.get(&sensor_id).map_or(0, VecDeque::len)
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

/// Everything a payload codec needs to turn raw values into readings
pub struct Conversion<'a> {
    evaluator: &'a dyn FormulaEvaluator,
    windows: &'a mut SmoothingWindows,
    timestamp: DateTime<Utc>,
}

impl<'a> Conversion<'a> {
    pub fn new(
        evaluator: &'a dyn FormulaEvaluator,
        windows: &'a mut SmoothingWindows,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            evaluator,
            windows,
            timestamp,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Convert a raw value through the channel formula and bias
    ///
    /// `builtin` is used when the channel has no formula; `None` means the
    /// raw value is already in engineering units.
    pub fn apply(
        &mut self,
        channel: &ChannelConfig,
        raw: f64,
        t: f64,
        builtin: Option<&dyn Fn(f64, f64) -> f64>,
    ) -> MidResult<f64> {
        let value = match (&channel.formula, builtin) {
            (Some(formula), _) => self.evaluator.evaluate(formula, raw, t)?,
            (None, Some(builtin)) => builtin(raw, t),
            (None, None) => raw,
        } + channel.bias;

        Ok(match channel.sensor_id {
            Some(id) if channel.smooth => self.windows.push(id, value),
            _ => value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn eval(formula: &str, x: f64) -> MidResult<f64> {
        SafeFormulaEvaluator::new().evaluate(formula, x, 0.0)
    }

    #[test]
    fn test_arithmetic() {
        assert!((eval("x*0.5+2", 10.0).unwrap() - 7.0).abs() < 1e-12);
        assert!((eval("x", 3.0).unwrap() - 3.0).abs() < 1e-12);
        assert!((eval("x**2", 3.0).unwrap() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_whitelisted_functions() {
        assert!((eval("sqrt(x)", 16.0).unwrap() - 4.0).abs() < 1e-12);
        assert!((eval("pow(x, 3)", 2.0).unwrap() - 8.0).abs() < 1e-12);
        assert!((eval("log10(x)", 1000.0).unwrap() - 3.0).abs() < 1e-12);
        assert!((eval("abs(x) + fabs(x)", -2.0).unwrap() - 4.0).abs() < 1e-12);
        assert!((eval("cos(pi)", 0.0).unwrap() + 1.0).abs() < 1e-12);
        assert!((eval("log(e)", 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((eval("atan2(1, 1)", 0.0).unwrap() - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn test_secondary_variable() {
        let value = SafeFormulaEvaluator::new()
            .evaluate("x + t", 1.0, 2.5)
            .unwrap();
        assert!((value - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_unknown_identifiers() {
        assert!(matches!(
            eval("y + 1", 1.0),
            Err(MidError::FormulaEvaluation { .. })
        ));
        assert!(matches!(
            eval("math::sqrt(x)", 4.0),
            Err(MidError::FormulaEvaluation { .. })
        ));
        assert!(eval("min(x, 1)", 4.0).is_err());
    }

    #[test]
    fn test_rejects_math_errors() {
        assert!(eval("1.0 / (x - 1)", 1.0).is_err());
        assert!(eval("log(x)", -1.0).is_err());
        assert!(eval("sqrt(x)", -4.0).is_err());
    }

    #[test]
    fn test_smoothing_window() {
        let mut windows = SmoothingWindows::with_size(3);
        assert_eq!(windows.push(1, 3.0), 3.0);
        assert_eq!(windows.push(1, 6.0), 4.5);
        assert_eq!(windows.push(1, 9.0), 6.0);
        assert_eq!(windows.push(1, 12.0), 9.0);
        assert_eq!(windows.len(1), 3);
        assert_eq!(windows.push(2, 1.0), 1.0);
    }

    #[test]
    fn test_apply_uses_formula_and_bias() {
        let mut evaluator = MockFormulaEvaluator::new();
        evaluator
            .expect_evaluate()
            .with(eq("x/2"), eq(10.0), eq(0.0))
            .times(1)
            .returning(|_, x, _| Ok(x / 2.0));

        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, Utc::now());
        let channel = ChannelConfig::new(5).with_formula("x/2").with_bias(1.0);
        assert_eq!(ctx.apply(&channel, 10.0, 0.0, None).unwrap(), 6.0);
    }

    #[test]
    fn test_apply_builtin_and_smoothing() {
        let evaluator = MockFormulaEvaluator::new();
        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, Utc::now());
        let channel = ChannelConfig::new(5).smoothed();
        let double = |x: f64, _t: f64| x * 2.0;

        assert_eq!(ctx.apply(&channel, 1.0, 0.0, Some(&double)).unwrap(), 2.0);
        assert_eq!(ctx.apply(&channel, 2.0, 0.0, Some(&double)).unwrap(), 3.0);
        assert_eq!(windows.len(5), 2);
    }
}
