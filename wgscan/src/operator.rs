//! Combining operators and the element types they act on.
//!
//! An [`Operator`] must be associative over the values it is applied to.
//! It does not have to be commutative: the scan always passes the earlier
//! part of the sequence as the left operand.

use std::fmt;
use std::sync::Arc;

use super::error::ScanError;

/// A value that can be scanned.
///
/// Types with a `WGSL_TYPE` can also be scanned on the device; the others
/// are host-only.
pub trait Element: bytemuck::Pod + Send + Sync + PartialOrd + fmt::Debug + 'static {
    const WGSL_TYPE: Option<&'static str>;
    const ZERO: Self;
    const ONE: Self;
    /// Identity of `Max`.
    const LOWEST: Self;
    /// Identity of `Min`.
    const HIGHEST: Self;

    /// Addition; integers wrap the way device arithmetic does.
    fn plus(self, rhs: Self) -> Self;
    /// Multiplication; integers wrap the way device arithmetic does.
    fn times(self, rhs: Self) -> Self;
}

macro_rules! impl_int_element {
    ($t:ty, $wgsl:expr) => {
        impl Element for $t {
            const WGSL_TYPE: Option<&'static str> = $wgsl;
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const LOWEST: Self = <$t>::MIN;
            const HIGHEST: Self = <$t>::MAX;

            #[inline]
            fn plus(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            #[inline]
            fn times(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        }
    };
}

macro_rules! impl_float_element {
    ($t:ty, $wgsl:expr) => {
        impl Element for $t {
            const WGSL_TYPE: Option<&'static str> = $wgsl;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const LOWEST: Self = <$t>::NEG_INFINITY;
            const HIGHEST: Self = <$t>::INFINITY;

            #[inline]
            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            #[inline]
            fn times(self, rhs: Self) -> Self {
                self * rhs
            }
        }
    };
}

impl_int_element!(u32, Some("u32"));
impl_int_element!(i32, Some("i32"));
impl_int_element!(u64, None);
impl_int_element!(i64, None);
impl_float_element!(f32, Some("f32"));
impl_float_element!(f64, None);

/// User supplied operator.
///
/// The host closure is always required. `wgsl` is the body of
/// `fn combine(a: T, b: T) -> T` and is only needed to run on the device;
/// `user_code` is extra WGSL (helper functions, constants) placed in front
/// of it.
#[derive(Clone)]
pub struct CustomOp<T: Element> {
    name: String,
    identity: T,
    combine: Arc<dyn Fn(T, T) -> T + Send + Sync>,
    wgsl: Option<String>,
    user_code: String,
}

impl<T: Element> CustomOp<T> {
    pub fn new<F>(name: impl Into<String>, identity: T, combine: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            identity,
            combine: Arc::new(combine),
            wgsl: None,
            user_code: String::new(),
        }
    }

    pub fn with_wgsl(mut self, body: impl Into<String>) -> Self {
        self.wgsl = Some(body.into());
        self
    }

    pub fn with_user_code(mut self, code: impl Into<String>) -> Self {
        self.user_code = code.into();
        self
    }
}

/// The combining operator of a scan.
///
/// Known limitations:
/// - Integer `Add` and `Multiply` wrap on overflow; overflow is not reported.
/// - Float `Min` and `Max` with NaN: the host keeps the left operand unless
///   the right one compares strictly smaller (larger), so a NaN on the left
///   sticks and a NaN on the right is dropped. WGSL `min`/`max` leave NaN
///   handling unspecified, so device results may differ from the host.
#[derive(Clone)]
pub enum Operator<T: Element> {
    Add,
    Multiply,
    Min,
    Max,
    Custom(CustomOp<T>),
}

impl<T: Element> Default for Operator<T> {
    fn default() -> Self {
        Operator::Add
    }
}

impl<T: Element> fmt::Debug for Operator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Custom(op) => f
                .debug_struct("Custom")
                .field("name", &op.name)
                .field("identity", &op.identity)
                .field("device", &op.wgsl.is_some())
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl<T: Element> Operator<T> {
    pub fn custom<F>(name: impl Into<String>, identity: T, combine: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Operator::Custom(CustomOp::new(name, identity, combine))
    }

    pub fn name(&self) -> &str {
        match self {
            Operator::Add => "add",
            Operator::Multiply => "multiply",
            Operator::Min => "min",
            Operator::Max => "max",
            Operator::Custom(op) => &op.name,
        }
    }

    #[inline]
    pub fn combine(&self, left: T, right: T) -> T {
        match self {
            Operator::Add => left.plus(right),
            Operator::Multiply => left.times(right),
            // Ties keep the left operand.
            Operator::Min => {
                if right < left {
                    right
                } else {
                    left
                }
            }
            Operator::Max => {
                if right > left {
                    right
                } else {
                    left
                }
            }
            Operator::Custom(op) => (op.combine)(left, right),
        }
    }

    pub fn identity(&self) -> T {
        match self {
            Operator::Add => T::ZERO,
            Operator::Multiply => T::ONE,
            Operator::Min => T::HIGHEST,
            Operator::Max => T::LOWEST,
            Operator::Custom(op) => op.identity,
        }
    }

    /// Body of the WGSL `combine(a, b)` function for this operator.
    pub fn wgsl_combine(&self) -> Result<String, ScanError> {
        match self {
            Operator::Add => Ok("return a + b;".to_string()),
            Operator::Multiply => Ok("return a * b;".to_string()),
            Operator::Min => Ok("return min(a, b);".to_string()),
            Operator::Max => Ok("return max(a, b);".to_string()),
            Operator::Custom(op) => match &op.wgsl {
                Some(body) if !body.trim().is_empty() => Ok(body.clone()),
                _ => Err(ScanError::OperatorGeneration(format!(
                    "custom operator `{}` has no device source",
                    op.name
                ))),
            },
        }
    }

    pub fn user_code(&self) -> &str {
        match self {
            Operator::Custom(op) => &op.user_code,
            _ => "",
        }
    }
}
