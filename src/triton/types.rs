//! Triton tensor helpers.
//!
//! Inputs are sent as typed contents; outputs are read back from the raw
//! binary buffers Triton returns next to the tensor metadata.

use crate::error::{AppError, Result};
use crate::triton::proto::model_infer_request::{InferInputTensor, InferRequestedOutputTensor};
use crate::triton::proto::{InferTensorContents, ModelInferResponse};
use bytes::Bytes;

/// Defines a tensor's data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorDataType {
    /// 32-bit floating point
    Float32,
}

impl TensorDataType {
    /// Convert to Triton datatype string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "FP32",
        }
    }

    /// Parse a Triton datatype string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FP32" => Some(Self::Float32),
            _ => None,
        }
    }

    /// Get the size in bytes of a single element of this type.
    pub fn element_size(&self) -> usize {
        match self {
            Self::Float32 => 4,
        }
    }
}

/// FP32 input tensor with shape `[1, n]`.
pub fn waveform_input(name: &str, waveform: &[f32]) -> InferInputTensor {
    InferInputTensor {
        name: name.to_string(),
        datatype: TensorDataType::Float32.as_str().to_string(),
        shape: vec![1, waveform.len() as i64],
        contents: Some(InferTensorContents {
            fp32_contents: waveform.to_vec(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Requested output by name.
pub fn requested_output(name: &str) -> InferRequestedOutputTensor {
    InferRequestedOutputTensor {
        name: name.to_string(),
        ..Default::default()
    }
}

/// Represents a raw tensor from Triton's binary response format.
#[derive(Debug)]
pub struct RawTensor {
    pub name: String,
    pub dtype: TensorDataType,
    pub shape: Vec<i64>,
    pub data: Bytes,
}

impl RawTensor {
    /// Number of elements declared by the shape.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().fold(1, |acc, &dim| acc * dim.max(0) as usize)
    }

    /// Parse the tensor's raw binary data as f32.
    pub fn as_f32(&self) -> Result<Vec<f32>> {
        if self.dtype != TensorDataType::Float32 {
            return Err(AppError::Model(format!(
                "Cannot parse tensor '{}' as f32, its type is {}",
                self.name,
                self.dtype.as_str()
            )));
        }

        Ok(self
            .data
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

/// Extract the output tensor `name` from a response.
///
/// Triton stores the raw buffer of the i-th output at index i of
/// `raw_output_contents`. The buffer size must match the declared shape.
pub fn output_tensor(response: &ModelInferResponse, name: &str) -> Result<RawTensor> {
    let (index, output) = response
        .outputs
        .iter()
        .enumerate()
        .find(|(_, output)| output.name == name)
        .ok_or_else(|| AppError::Model(format!("Missing '{}' tensor in response", name)))?;

    let dtype = TensorDataType::parse(&output.datatype).ok_or_else(|| {
        AppError::Model(format!("Unsupported tensor datatype: {}", output.datatype))
    })?;

    let data = match response.raw_output_contents.get(index) {
        Some(raw) => Bytes::copy_from_slice(raw),
        None => match &output.contents {
            Some(contents) if dtype == TensorDataType::Float32 => contents
                .fp32_contents
                .iter()
                .flat_map(|value| value.to_le_bytes())
                .collect::<Vec<u8>>()
                .into(),
            _ => {
                return Err(AppError::Model(format!(
                    "Response does not contain data for tensor '{}'",
                    name
                )))
            }
        },
    };

    let tensor = RawTensor {
        name: name.to_string(),
        dtype,
        shape: output.shape.clone(),
        data,
    };

    let expected = tensor.num_elements() * dtype.element_size();
    if tensor.data.len() != expected {
        return Err(AppError::Model(format!(
            "Tensor '{}' size mismatch: expected {} bytes, got {}",
            name,
            expected,
            tensor.data.len()
        )));
    }

    Ok(tensor)
}
