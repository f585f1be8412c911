use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tch::Tensor;

pub fn _gelu(x: &Tensor) -> Tensor {
    x * 0.5 * (1.0 + (x / ((2.0_f64).sqrt())).erf())
}

pub fn _relu(x: &Tensor) -> Tensor {
    x.relu()
}

pub fn _gelu_new(x: &Tensor) -> Tensor {
    x * 0.5 * (((x * x * x * 0.044715 + x) * ((2_f64 / PI).sqrt())).tanh() + 1.0)
}

pub fn _tanh(x: &Tensor) -> Tensor {
    x.tanh()
}

/// Wrapper around a tensor-to-tensor activation function
pub struct TensorFunction(Box<fn(&Tensor) -> Tensor>);

impl TensorFunction {
    pub fn new(fun: Box<fn(&Tensor) -> Tensor>) -> Self {
        Self(fun)
    }

    pub fn get_fn(&self) -> &fn(&Tensor) -> Tensor {
        &self.0
    }
}

impl std::fmt::Debug for TensorFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TensorFunction")
    }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
/// # Activation function used in the feed-forward layers
pub enum Activation {
    /// Gaussian Error Linear Unit ([Hendrycks et al., 2016](https://arxiv.org/abs/1606.08415))
    gelu,
    /// Rectified Linear Unit
    relu,
    /// GELU (tanh approximation)
    gelu_new,
    /// Hyperbolic tangent
    tanh,
}

impl Activation {
    pub fn get_function(&self) -> TensorFunction {
        TensorFunction::new(Box::new(match self {
            Activation::gelu => _gelu,
            Activation::relu => _relu,
            Activation::gelu_new => _gelu_new,
            Activation::tanh => _tanh,
        }))
    }
}
