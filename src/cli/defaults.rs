/// Values of all preset-dependent options
///
pub struct Preset {
    pub baq: bool,
    pub consensus: bool,
    pub indel_threshold: u32,
    pub gap_open: f64,
    pub gap_ext: f64,
    pub bandwidth: usize,
    pub init_q: u8,
    pub min_q: u8,
    pub prim_margin_score: f64,
    pub prim_margin_random: f64,
    pub min_score: f64,
}

pub const DEFAULT_PRESET: Preset = Preset {
    baq: false,
    consensus: false,
    indel_threshold: 10,
    gap_open: 1e-4,
    gap_ext: 0.1,
    bandwidth: 20,
    init_q: 40,
    min_q: 20,
    prim_margin_score: 50.0,
    prim_margin_random: 50.0,
    min_score: -50.0,
};

pub const HIFI_PRESET: Preset = Preset {
    baq: true,
    consensus: true,
    indel_threshold: 10,
    gap_open: 1e-4,
    gap_ext: 0.1,
    bandwidth: 20,
    init_q: 40,
    min_q: 10,
    prim_margin_score: 50.0,
    prim_margin_random: 50.0,
    min_score: -50.0,
};

pub const ONT_PRESET: Preset = Preset {
    baq: true,
    consensus: true,
    indel_threshold: 20,
    gap_open: 1e-3,
    gap_ext: 0.1,
    bandwidth: 20,
    init_q: 20,
    min_q: 10,
    prim_margin_score: 10.0,
    prim_margin_random: 10.0,
    min_score: -50.0,
};

pub const MIN_VARIANT_MARGIN: i64 = 50;
