//! Derived feature formulas
//!
//! Heights are in centimeters (the unit normalization stage runs first),
//! weights in kilograms and ages in years. Sex-dependent branches compare
//! against the canonical label exactly.

use super::frame::{Column, Frame};
use super::PipelineError;

/// Canonical label selecting the female branch of sex-dependent formulas
pub const FEMALE: &str = "Female";

/// Body Mass Index, kg/m²
pub fn body_mass_index(weight: f64, height_cm: f64) -> f64 {
    let height_m = height_cm / 100.0;
    weight / (height_m * height_m)
}

/// Basal Metabolic Rate (Mifflin-St Jeor)
pub fn basal_metabolic_rate(weight: f64, height_cm: f64, age: f64, gender: &str) -> f64 {
    let offset = if gender == FEMALE { -161.0 } else { 5.0 };
    10.0 * weight + 6.25 * height_cm - 5.0 * age + offset
}

/// Physical Activity Level: activity frequency minus screen time
pub fn physical_activity_level(faf: f64, tue: f64) -> f64 {
    faf - tue
}

/// 1 when activity frequency is at most 1
pub fn is_sedentary(faf: f64) -> f64 {
    if faf <= 1.0 {
        1.0
    } else {
        0.0
    }
}

/// 1 when vegetables are eaten at least as often as main meals
pub fn eats_vegetables_every_meal(fcvc: f64, ncp: f64) -> f64 {
    if fcvc >= ncp {
        1.0
    } else {
        0.0
    }
}

/// Body Surface Area (Schlich)
pub fn body_surface_area(gender: &str, height_cm: f64, weight: f64) -> f64 {
    if gender == FEMALE {
        0.000975482 * weight.powf(0.46) * height_cm.powf(1.08)
    } else {
        0.000579479 * weight.powf(0.38) * height_cm.powf(1.24)
    }
}

/// Ideal Body Weight (Devine), anchored at 152 cm
pub fn ideal_body_weight(gender: &str, height_cm: f64) -> f64 {
    let base = if gender == FEMALE { 45.5 } else { 50.0 };
    base + 0.9 * (height_cm - 152.0)
}

/// A derived column the synthesis stage can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedFeature {
    Bmi,
    Bmr,
    Pal,
    IsSedentary,
    Evemm,
    Bsa,
    Ibw,
}

impl DerivedFeature {
    /// Name of the produced column
    pub fn column(&self) -> &'static str {
        match self {
            DerivedFeature::Bmi => "BMI",
            DerivedFeature::Bmr => "BMR",
            DerivedFeature::Pal => "PAL",
            DerivedFeature::IsSedentary => "IS",
            DerivedFeature::Evemm => "EVEMM",
            DerivedFeature::Bsa => "BSA",
            DerivedFeature::Ibw => "IBW",
        }
    }

    /// Raw columns the formula reads
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            DerivedFeature::Bmi => &["Weight", "Height"],
            DerivedFeature::Bmr => &["Weight", "Height", "Age", "Gender"],
            DerivedFeature::Pal => &["FAF", "TUE"],
            DerivedFeature::IsSedentary => &["FAF"],
            DerivedFeature::Evemm => &["FCVC", "NCP"],
            DerivedFeature::Bsa => &["Gender", "Height", "Weight"],
            DerivedFeature::Ibw => &["Gender", "Height"],
        }
    }

    /// Evaluate the formula over every row of the frame
    pub fn compute(&self, frame: &Frame) -> Result<Column, PipelineError> {
        let stage = super::stages::DERIVED_STAGE;
        let num = |name: &str| {
            frame.numeric(name).ok_or_else(|| PipelineError::MissingColumn {
                stage,
                column: name.to_string(),
            })
        };
        let cat = |name: &str| {
            frame.categorical(name).ok_or_else(|| PipelineError::MissingColumn {
                stage,
                column: name.to_string(),
            })
        };

        let values: Vec<f64> = match self {
            DerivedFeature::Bmi => zip2(num("Weight")?, num("Height")?, body_mass_index),
            DerivedFeature::Bmr => {
                let (weight, height, age) = (num("Weight")?, num("Height")?, num("Age")?);
                cat("Gender")?
                    .iter()
                    .enumerate()
                    .map(|(i, g)| basal_metabolic_rate(weight[i], height[i], age[i], g))
                    .collect()
            }
            DerivedFeature::Pal => zip2(num("FAF")?, num("TUE")?, physical_activity_level),
            DerivedFeature::IsSedentary => num("FAF")?.iter().map(|&f| is_sedentary(f)).collect(),
            DerivedFeature::Evemm => zip2(num("FCVC")?, num("NCP")?, eats_vegetables_every_meal),
            DerivedFeature::Bsa => {
                let (height, weight) = (num("Height")?, num("Weight")?);
                cat("Gender")?
                    .iter()
                    .enumerate()
                    .map(|(i, g)| body_surface_area(g, height[i], weight[i]))
                    .collect()
            }
            DerivedFeature::Ibw => {
                let height = num("Height")?;
                cat("Gender")?
                    .iter()
                    .zip(height)
                    .map(|(g, &h)| ideal_body_weight(g, h))
                    .collect()
            }
        };

        Ok(Column::Numeric(values))
    }
}

fn zip2(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}
