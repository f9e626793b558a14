use typed_index_collections::{TiSlice, TiVec};

use crate::milp::VarId;

/// Creates one variable per element of an index set
pub trait AddVars<K> {
    type Out;

    /// Create a variable with a closure
    fn vars_with<F: FnMut(K) -> VarId>(&self, func: F) -> Self::Out;
}

impl<K: From<usize>> AddVars<K> for usize {
    type Out = TiVec<K, VarId>;

    fn vars_with<F: FnMut(K) -> VarId>(&self, mut func: F) -> Self::Out {
        let mut vec = Vec::with_capacity(*self);
        for i in 0..*self {
            vec.push(func(K::from(i)));
        }

        vec.into()
    }
}

impl<K1, K2> AddVars<(K1, K2)> for (usize, usize)
where
    K1: From<usize> + Copy,
    K2: From<usize>,
{
    type Out = TiVec<K1, TiVec<K2, VarId>>;

    fn vars_with<F: FnMut((K1, K2)) -> VarId>(&self, mut func: F) -> Self::Out {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            let i = K1::from(i);
            out.push(<usize as AddVars<K2>>::vars_with(&self.1, |j| func((i, j))));
        }

        out.into()
    }
}

/// Reads the solver values of variables into the same shape
pub trait ConvertVars {
    type Out;
    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out;
}

impl ConvertVars for VarId {
    type Out = f64;

    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out {
        values[*self]
    }
}

impl<T: ConvertVars> ConvertVars for Option<T> {
    type Out = Option<T::Out>;

    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out {
        self.as_ref().map(|e| e.convert(values))
    }
}

impl<K, T: ConvertVars> ConvertVars for TiVec<K, T> {
    type Out = TiVec<K, T::Out>;

    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out {
        self.iter()
            .map(|e| e.convert(values))
            .collect::<Vec<_>>()
            .into()
    }
}
