//! YuNet face box model.

use std::path::Path;

use anyhow::{Result, anyhow};
use tract_onnx::prelude::{IntoTensor, Tensor, tvec};

use crate::{
    onnx::{RunnableModel, load_runnable},
    postprocess::RawFace,
    preprocess::InputSize,
};

const STRIDES: [usize; 3] = [8, 16, 32];
/// cls, obj, bbox and keypoint heads per stride.
const HEADS: usize = 4;
/// Columns of the pre-fused single-output export: bbox, ten landmark values, score.
const FUSED_COLS: usize = 15;

/// YuNet graph ready to run at a fixed input size.
#[derive(Debug)]
pub struct FaceModel {
    plan: RunnableModel,
    input_size: InputSize,
}

impl FaceModel {
    pub fn load<P: AsRef<Path>>(path: P, input_size: InputSize) -> Result<Self> {
        let plan = load_runnable(path.as_ref(), "face detector")?;
        Ok(Self { plan, input_size })
    }

    pub fn input_size(&self) -> InputSize {
        self.input_size
    }

    /// Run the graph and decode every cell into detector-input pixel space.
    pub fn run(&self, input: Tensor) -> Result<Vec<RawFace>> {
        let outputs = self
            .plan
            .run(tvec![input.into()])
            .map_err(|e| anyhow!("face detector execution failed: {e}"))?;
        let tensors: Vec<Tensor> = outputs.into_iter().map(|v| v.into_tensor()).collect();

        match tensors.as_slice() {
            [] => anyhow::bail!("face detector produced no outputs"),
            [fused] => decode_fused(fused),
            heads if heads.len() == STRIDES.len() * HEADS => decode_heads(heads, self.input_size),
            other => anyhow::bail!(
                "unexpected number of face detector outputs: expected 1 or {}, got {}",
                STRIDES.len() * HEADS,
                other.len()
            ),
        }
    }
}

fn decode_fused(output: &Tensor) -> Result<Vec<RawFace>> {
    let rows = match output.shape() {
        [rows, FUSED_COLS] | [1, rows, FUSED_COLS] => *rows,
        other => anyhow::bail!("fused detector output must be [N, 15], got {other:?}"),
    };
    let values = output
        .as_slice::<f32>()
        .map_err(|e| anyhow!("fused detector output is not f32: {e}"))?;
    anyhow::ensure!(values.len() == rows * FUSED_COLS, "fused output is truncated");
    Ok(values
        .chunks_exact(FUSED_COLS)
        .map(|row| RawFace {
            x: row[0],
            y: row[1],
            width: row[2],
            height: row[3],
            score: row[14],
        })
        .collect())
}

/// Decode the per-stride cls/obj/bbox heads. Keypoint heads are ignored.
pub(crate) fn decode_heads(outputs: &[Tensor], input_size: InputSize) -> Result<Vec<RawFace>> {
    let pad_w = (input_size.width as usize).div_ceil(32) * 32;
    let pad_h = (input_size.height as usize).div_ceil(32) * 32;
    let mut faces = Vec::new();

    for (index, &stride) in STRIDES.iter().enumerate() {
        let cols = pad_w / stride;
        let rows = pad_h / stride;
        let cells = cols * rows;
        let cls = head_slice(&outputs[index], "cls", cells)?;
        let obj = head_slice(&outputs[index + STRIDES.len()], "obj", cells)?;
        let bbox = head_slice(&outputs[index + STRIDES.len() * 2], "bbox", cells * 4)?;
        let stride_f = stride as f32;

        faces.reserve(cells);
        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
                let [dx, dy, dw, dh] = [
                    bbox[idx * 4],
                    bbox[idx * 4 + 1],
                    bbox[idx * 4 + 2],
                    bbox[idx * 4 + 3],
                ];
                let cx = (col as f32 + dx) * stride_f;
                let cy = (row as f32 + dy) * stride_f;
                let width = dw.exp() * stride_f;
                let height = dh.exp() * stride_f;
                faces.push(RawFace {
                    x: (-0.5f32).mul_add(width, cx),
                    y: (-0.5f32).mul_add(height, cy),
                    width,
                    height,
                    score: if score.is_finite() { score } else { 0.0 },
                });
            }
        }
    }
    Ok(faces)
}

fn head_slice<'a>(tensor: &'a Tensor, head: &str, expected: usize) -> Result<&'a [f32]> {
    let values = tensor
        .as_slice::<f32>()
        .map_err(|e| anyhow!("{head} output not f32: {e}"))?;
    anyhow::ensure!(
        values.len() == expected,
        "{head} length mismatch: expected {expected}, got {}",
        values.len()
    );
    Ok(values)
}
