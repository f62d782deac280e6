//! Named glasses with published Sellmeier coefficients.

use thiserror::Error;

use crate::sellmeier::Material;

/// Errors from the material catalogue.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Material not found: {0}")]
    NotFound(String),
}

/// Identifiers accepted by [`lookup`].
pub const CATALOGUE: &[&str] = &["Air", "LASF46B", "N-BK7", "FusedSilica"];

/// Ohara/Hoya-type dense lanthanum flint, n ≈ 1.9 in the visible.
pub fn lasf46b() -> Material {
    Material::new(
        "LASF46B",
        [
            2.179_889_22,
            0.306_495_184,
            1.568_824_37,
            0.012_580_538,
            0.056_719_137,
            105.316_538,
        ],
    )
}

/// Schott N-BK7 borosilicate crown.
pub fn n_bk7() -> Material {
    Material::new(
        "N-BK7",
        [
            1.039_612_12,
            0.231_792_344,
            1.010_469_45,
            0.006_000_698_67,
            0.020_017_914_4,
            103.560_653,
        ],
    )
}

/// Fused silica (Malitson 1965).
pub fn fused_silica() -> Material {
    Material::new(
        "FusedSilica",
        [
            0.696_166_3,
            0.407_942_6,
            0.897_479_4,
            0.004_679_148,
            0.013_512_063,
            97.934_002_5,
        ],
    )
}

/// Resolve a catalogue identifier.
pub fn lookup(name: &str) -> Result<Material, MaterialError> {
    match name {
        "Air" => Ok(Material::air()),
        "LASF46B" => Ok(lasf46b()),
        "N-BK7" => Ok(n_bk7()),
        "FusedSilica" => Ok(fused_silica()),
        _ => Err(MaterialError::NotFound(name.to_string())),
    }
}
