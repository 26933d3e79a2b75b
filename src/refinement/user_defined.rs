use crate::algorithms::refinement::IndicatorFunctor;
use crate::storage::element::{CoefficientLayout, Element};

///
/// A function that defines how the indicator is computed.
///
/// # Arguments
/// - `coeff`: coefficient block of the element
/// - `element`: the element itself (key, support, flags)
///
pub type UserIndicatorFunction = dyn Fn(&[f64], &Element) -> f64 + Send + Sync;

pub struct UserDefinedIndicator
{
    pub fun_eval: Box<UserIndicatorFunction>,
}

impl UserDefinedIndicator
{
    pub fn new<F: Fn(&[f64], &Element) -> f64 + Send + Sync + 'static>(fun_eval: F) -> Self
    {
        Self { fun_eval: Box::new(fun_eval) }
    }
}

impl IndicatorFunctor for UserDefinedIndicator
{
    fn eval(&self, element: &Element, _layout: &CoefficientLayout) -> f64
    {
        (self.fun_eval)(element.coeff(), element)
    }
}
