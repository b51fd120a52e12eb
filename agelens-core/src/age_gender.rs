//! Age and gender head run on individual face crops.
//!
//! The network takes a 96x96 RGB crop in `[1, 3, 96, 96]` layout with raw
//! 0-255 values and emits `[female_logit, male_logit, age / 100]`.

use std::path::Path;

use agelens_utils::{resize_rgb, rgb_to_rgb_chw, timing_guard};
use anyhow::{Result, anyhow};
use image::{RgbImage, imageops::FilterType};
use tract_onnx::prelude::{Tensor, tvec};

use crate::{
    onnx::{RunnableModel, load_runnable},
    record::{AgeGender, Gender},
};

const INPUT_SIDE: u32 = 96;

#[derive(Debug)]
pub struct AgeGenderModel {
    plan: RunnableModel,
}

impl AgeGenderModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let plan = load_runnable(path.as_ref(), "age/gender")?;
        Ok(Self { plan })
    }

    /// Estimate attributes for a face crop.
    pub fn estimate(&self, face: &RgbImage) -> Result<AgeGender> {
        let _guard = timing_guard("agelens_core::age_gender", log::Level::Debug);
        anyhow::ensure!(
            face.width() > 0 && face.height() > 0,
            "face crop is empty"
        );
        let resized = resize_rgb(face, INPUT_SIDE, INPUT_SIDE, FilterType::Triangle);
        let (data, _) = rgb_to_rgb_chw(&resized).into_raw_vec_and_offset();
        let side = INPUT_SIDE as usize;
        let input = Tensor::from_shape(&[1, 3, side, side], &data)
            .map_err(|e| anyhow!("failed to build age/gender tensor: {e}"))?;

        let outputs = self
            .plan
            .run(tvec![input.into()])
            .map_err(|e| anyhow!("age/gender execution failed: {e}"))?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("age/gender model produced no outputs"))?;
        let values = output
            .as_slice::<f32>()
            .map_err(|e| anyhow!("age/gender output is not f32: {e}"))?;
        interpret_output(values)
    }
}

/// Turn the raw output triple into attributes.
pub(crate) fn interpret_output(values: &[f32]) -> Result<AgeGender> {
    let &[female, male, age] = values else {
        anyhow::bail!(
            "age/gender output must have 3 values, got {}",
            values.len()
        );
    };
    // Softmax over the two gender logits.
    let peak = female.max(male);
    let (ef, em) = ((female - peak).exp(), (male - peak).exp());
    let p_male = em / (ef + em);

    let (gender, probability) = if p_male >= 0.5 {
        (Gender::Male, p_male)
    } else {
        (Gender::Female, 1.0 - p_male)
    };
    Ok(AgeGender {
        age: Some(age * 100.0).filter(|a| a.is_finite()),
        gender: Some(gender),
        gender_probability: Some(probability).filter(|p| p.is_finite()),
    })
}
