use ndarray::Array4;
use thiserror::Error;
use tract_onnx::prelude::*;

use crate::models::Prediction;

/// Fixed mapping from model output index to class name.
pub const CLASS_NAMES: [&str; 3] = ["Early Blight", "Healthy", "Late Blight"];

// Input geometry the model was trained with, NHWC.
const INPUT_HEIGHT: usize = 256;
const INPUT_WIDTH: usize = 256;
const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("decoded image is {width}x{height}, model expects {INPUT_WIDTH}x{INPUT_HEIGHT}")]
    ShapeMismatch { width: u32, height: u32 },
    #[error("inference failed: {0}")]
    Inference(#[from] TractError),
}

/// The loaded model plan plus the static label list. Created once at startup
/// and shared read-only across requests.
pub struct Classifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
}

impl Classifier {
    pub fn load<P: AsRef<std::path::Path>>(model_path: P) -> TractResult<Self> {
        let model = tract_onnx::onnx()
            .model_for_path(model_path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, INPUT_HEIGHT, INPUT_WIDTH, CHANNELS),
                ),
            )?
            .into_optimized()?
            .into_runnable()?;

        Ok(Self { model })
    }

    /// Run the full pipeline on an uploaded byte buffer: decode, batch,
    /// forward pass, argmax.
    pub fn classify(&self, data: &[u8]) -> Result<Prediction, ClassifyError> {
        let batch = decode_batch(data)?;
        let input = Tensor::from_shape(
            &[1, INPUT_HEIGHT, INPUT_WIDTH, CHANNELS],
            &batch.into_raw_vec(),
        )?;

        let outputs = self.model.run(tvec!(input.into()))?;
        let scores = outputs[0].to_array_view::<f32>()?;

        let (index, score) = top_score(scores.iter().copied())
            .ok_or_else(|| anyhow::anyhow!("model produced an empty output"))?;
        let label = CLASS_NAMES
            .get(index)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("class index {} outside the label list", index))?;

        Ok(Prediction {
            label,
            confidence: score * 100.0,
        })
    }
}

/// Decode an uploaded byte buffer and lay it out as a single-image batch.
/// Pixel values are carried as raw 0..=255 floats, the range the model was
/// trained on.
fn decode_batch(data: &[u8]) -> Result<Array4<f32>, ClassifyError> {
    let image = image::load_from_memory(data)?.to_rgb8();

    let (width, height) = image.dimensions();
    if width as usize != INPUT_WIDTH || height as usize != INPUT_HEIGHT {
        return Err(ClassifyError::ShapeMismatch { width, height });
    }

    let mut batch = Array4::zeros((1, INPUT_HEIGHT, INPUT_WIDTH, CHANNELS));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..CHANNELS {
            batch[[0, y as usize, x as usize, c]] = f32::from(pixel[c]);
        }
    }
    Ok(batch)
}

fn top_score(scores: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    scores.enumerate().max_by(|(_, a), (_, b)| a.total_cmp(b))
}
