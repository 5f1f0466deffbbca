/// Display geometry for spring entities, passed to whoever draws them
/// instead of living in per-type global state.
#[derive(Clone, Copy, Debug)]
pub struct SpringStyle {
    /// Number of coils along the spring body.
    pub coils: u32,
    /// Half-width of the coil zigzag, in entity-local units.
    pub coil_width: f32,
}

impl Default for SpringStyle {
    fn default() -> Self {
        Self {
            coils: 8,
            coil_width: 0.2,
        }
    }
}
