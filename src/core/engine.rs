use crate::{
    core::tensor::{check_shape, TensorFrame, TENSOR_SHAPE},
    error::{Result, StemError},
};

use anyhow::anyhow;
use log::info;
use once_cell::sync::OnceCell;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, Value},
};

static ORT_INIT: OnceCell<()> = OnceCell::new();

/// One loaded model: a stateless tensor-in / tensor-out call.
pub trait InferenceSession: Send {
    fn run(&mut self, input: TensorFrame) -> Result<TensorFrame>;
}

/// Builds inference sessions from raw weight bytes.
pub trait SessionFactory: Send + Sync {
    /// Make the inference runtime usable. Called on every load attempt.
    fn prepare_runtime(&self) -> Result<()>;

    fn create_session(&self, weights: &[u8]) -> Result<Box<dyn InferenceSession>>;
}

/// ONNX Runtime backed factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtFactory;

impl SessionFactory for OrtFactory {
    fn prepare_runtime(&self) -> Result<()> {
        // Pin error type so `?` is unambiguous.
        ORT_INIT.get_or_try_init::<_, StemError>(|| {
            ort::init()
                .with_name("vocal-split")
                .commit()
                .map_err(|e| StemError::ModelLoad(format!("onnxruntime init: {e}")))?;
            Ok(())
        })?;
        Ok(())
    }

    fn create_session(&self, weights: &[u8]) -> Result<Box<dyn InferenceSession>> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_memory(weights)?;
        Ok(Box::new(OrtSession::new(session)?))
    }
}

pub struct OrtSession {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OrtSession {
    pub fn new(session: Session) -> Result<Self> {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("Model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("Model declares no outputs"))?;
        info!("ONNX session ready: input '{input_name}', output '{output_name}'");
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }
}

impl InferenceSession for OrtSession {
    fn run(&mut self, input: TensorFrame) -> Result<TensorFrame> {
        check_shape(&input)?;
        let data = input.into_raw_vec();
        let value: Value = Tensor::from_array((TENSOR_SHAPE.to_vec(), data))?.into_dyn();

        let outputs = self
            .session
            .run(vec![(self.input_name.as_str(), value)])?;

        let out: Value = outputs
            .into_iter()
            .find_map(|(name, v)| if name == self.output_name { Some(v) } else { None })
            .ok_or_else(|| anyhow!("Model did not return '{}' output", self.output_name))?;

        let (_shape, data) = out.try_extract_tensor::<f32>()?;
        let expected: usize = TENSOR_SHAPE.iter().product();
        if data.len() != expected {
            return Err(StemError::Inference(format!(
                "Unexpected output length {} (expected {})",
                data.len(),
                expected
            )));
        }
        let frame = TensorFrame::from_shape_vec(TENSOR_SHAPE, data.to_vec())
            .map_err(|e| StemError::Inference(e.to_string()))?;
        Ok(frame)
    }
}
