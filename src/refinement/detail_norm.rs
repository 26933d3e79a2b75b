use crate::algorithms::refinement::IndicatorFunctor;
use crate::storage::element::{CoefficientLayout, Element};

///
/// L2 norm of the coefficients of the selected components. In an orthonormal
/// hierarchical basis every coefficient of an element is detail, so this is the
/// size of what the element adds on top of its ancestors.
///
#[derive(Clone, Debug)]
pub struct DetailNorm
{
    pub components: Vec<usize>,
}

impl DetailNorm
{
    pub fn new(components: &[usize]) -> Self
    {
        Self { components: components.to_vec() }
    }
}

impl IndicatorFunctor for DetailNorm
{
    fn eval(&self, element: &Element, layout: &CoefficientLayout) -> f64
    {
        self.components.iter().map(|&vec|
        {
            layout.component(element.coeff(), vec).iter().map(|c| c * c).sum::<f64>()
        }).sum::<f64>().sqrt()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::storage::element::ElementKey;

    #[test]
    fn norm_of_selected_components()
    {
        let layout = CoefficientLayout::new(1, 3, 2);
        let element = Element::new(ElementKey::root(1), 0, (vec![0.0], vec![1.0]), vec![3.0, 0.0, 100.0, 100.0, 0.0, 4.0], 0, 1);
        assert_eq!(DetailNorm::new(&[0, 2]).eval(&element, &layout), 5.0);
        assert_eq!(DetailNorm::new(&[]).eval(&element, &layout), 0.0);
    }
}
