//! SF2 hydra parsing and generator resolution.
//!
//! The `pdta` list stores presets, instruments and samples as flat record
//! arrays linked by indices (the "hydra"). Each array ends with a terminal
//! record whose bag index bounds the last real entry.

use super::riff::{self, Chunks};
use super::{EnvelopeParams, LoopMode, Preset, SampleRegion, Zone};
use crate::error::{Error, Result};

// Generator operators used by the synthesizer (SF2.01 section 8.1.2)
const START_ADDRS_OFFSET: u16 = 0;
const END_ADDRS_OFFSET: u16 = 1;
const STARTLOOP_ADDRS_OFFSET: u16 = 2;
const ENDLOOP_ADDRS_OFFSET: u16 = 3;
const START_ADDRS_COARSE_OFFSET: u16 = 4;
const END_ADDRS_COARSE_OFFSET: u16 = 12;
const PAN: u16 = 17;
const ATTACK_VOL_ENV: u16 = 34;
const DECAY_VOL_ENV: u16 = 36;
const SUSTAIN_VOL_ENV: u16 = 37;
const RELEASE_VOL_ENV: u16 = 38;
const INSTRUMENT: u16 = 41;
const KEY_RANGE: u16 = 43;
const VEL_RANGE: u16 = 44;
const STARTLOOP_ADDRS_COARSE_OFFSET: u16 = 45;
const INITIAL_ATTENUATION: u16 = 48;
const ENDLOOP_ADDRS_COARSE_OFFSET: u16 = 50;
const COARSE_TUNE: u16 = 51;
const FINE_TUNE: u16 = 52;
const SAMPLE_ID: u16 = 53;
const SAMPLE_MODES: u16 = 54;
const SCALE_TUNING: u16 = 56;
const OVERRIDING_ROOT_KEY: u16 = 58;

/// One past the highest defined generator operator.
const GENERATOR_COUNT: usize = 61;

/// Default envelope segment time (-12000 timecents, about 1 ms).
const DEFAULT_TIMECENTS: i32 = -12000;

const PHDR_SIZE: usize = 38;
const BAG_SIZE: usize = 4;
const GEN_SIZE: usize = 4;
const INST_SIZE: usize = 22;
const SHDR_SIZE: usize = 46;

struct PresetHeader {
    name: String,
    program: u16,
    bank: u16,
    bag: usize,
}

struct InstrumentHeader {
    bag: usize,
}

struct SampleHeader {
    start: u32,
    end: u32,
    loop_start: u32,
    loop_end: u32,
    sample_rate: u32,
    original_pitch: u8,
    pitch_correction: i8,
}

struct Generator {
    oper: u16,
    amount: i16,
}

/// Raw `pdta` record arrays.
#[derive(Default)]
struct Hydra {
    phdr: Vec<PresetHeader>,
    pbag: Vec<usize>,
    pgen: Vec<Generator>,
    inst: Vec<InstrumentHeader>,
    ibag: Vec<usize>,
    igen: Vec<Generator>,
    shdr: Vec<SampleHeader>,
}

/// Generator values of one zone, indexed by operator.
#[derive(Clone)]
struct GeneratorSet {
    values: [Option<i16>; GENERATOR_COUNT],
}

impl Default for GeneratorSet {
    fn default() -> Self {
        Self {
            values: [None; GENERATOR_COUNT],
        }
    }
}

impl GeneratorSet {
    fn set(&mut self, oper: u16, amount: i16) {
        if let Some(slot) = self.values.get_mut(oper as usize) {
            *slot = Some(amount);
        }
    }

    fn get(&self, oper: u16) -> Option<i16> {
        self.values.get(oper as usize).copied().flatten()
    }

    /// Signed value widened to `i32`, or `default` when unset.
    fn value(&self, oper: u16, default: i32) -> i32 {
        self.get(oper).map(i32::from).unwrap_or(default)
    }

    /// Index-typed value (instrument and sample ids are unsigned words).
    fn index(&self, oper: u16) -> Option<usize> {
        self.get(oper).map(|v| v as u16 as usize)
    }

    /// Range generators pack low and high bytes into the amount.
    fn range(&self, oper: u16) -> (u8, u8) {
        match self.get(oper) {
            Some(raw) => {
                let raw = raw as u16;
                ((raw & 0xFF) as u8, (raw >> 8) as u8)
            }
            None => (0, 127),
        }
    }

    /// Returns this zone's generators with unset values taken from `global`.
    fn over(&self, global: &GeneratorSet) -> GeneratorSet {
        let mut merged = global.clone();
        for (slot, value) in merged.values.iter_mut().zip(self.values.iter()) {
            if value.is_some() {
                *slot = *value;
            }
        }
        merged
    }
}

/// Parses an SF2 file into flattened presets and a normalized sample pool.
pub(super) fn parse(bytes: &[u8]) -> Result<(Vec<Preset>, Vec<f32>)> {
    let (form, body) = riff::read_riff(bytes)?;
    if &form != b"sfbk" {
        return Err(Error::invalid_file("RIFF form is not 'sfbk'"));
    }

    let mut samples = None;
    let mut hydra = None;
    for chunk in Chunks::new(body) {
        let chunk = chunk?;
        match chunk.as_list() {
            Some((kind, data)) if &kind == b"sdta" => samples = Some(read_sample_data(data)?),
            Some((kind, data)) if &kind == b"pdta" => hydra = Some(read_hydra(data)?),
            _ => {} // INFO and unknown chunks carry nothing we render
        }
    }

    let samples = samples.ok_or_else(|| Error::invalid_file("missing 'sdta' list"))?;
    let hydra = hydra.ok_or_else(|| Error::invalid_file("missing 'pdta' list"))?;
    let presets = build_presets(&hydra, samples.len())?;
    Ok((presets, samples))
}

/// Converts the 16-bit `smpl` chunk into `f32` samples.
fn read_sample_data(data: &[u8]) -> Result<Vec<f32>> {
    let smpl = Chunks::new(data)
        .filter_map(|c| c.ok())
        .find(|c| &c.id == b"smpl")
        .ok_or_else(|| Error::invalid_file("missing 'smpl' chunk"))?;

    let count = smpl.data.len() / 2;
    let mut samples = Vec::new();
    samples.try_reserve_exact(count)?;
    samples.extend(
        smpl.data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
    );
    Ok(samples)
}

fn read_generators(data: &[u8], what: &str) -> Result<Vec<Generator>> {
    Ok(riff::records(data, GEN_SIZE, what)?
        .map(|mut r| Generator {
            oper: r.u16(),
            amount: r.i16(),
        })
        .collect())
}

fn read_bags(data: &[u8], what: &str) -> Result<Vec<usize>> {
    Ok(riff::records(data, BAG_SIZE, what)?
        .map(|mut r| r.u16() as usize)
        .collect())
}

fn read_hydra(data: &[u8]) -> Result<Hydra> {
    let mut hydra = Hydra::default();
    let mut seen = [false; 7];

    for chunk in Chunks::new(data) {
        let chunk = chunk?;
        match &chunk.id {
            b"phdr" => {
                seen[0] = true;
                hydra.phdr = riff::records(chunk.data, PHDR_SIZE, "phdr")?
                    .map(|mut r| {
                        let name = r.name(20);
                        let program = r.u16();
                        let bank = r.u16();
                        let bag = r.u16() as usize;
                        r.skip(12); // library, genre, morphology
                        PresetHeader {
                            name,
                            program,
                            bank,
                            bag,
                        }
                    })
                    .collect();
            }
            b"pbag" => {
                seen[1] = true;
                hydra.pbag = read_bags(chunk.data, "pbag")?;
            }
            b"pgen" => {
                seen[2] = true;
                hydra.pgen = read_generators(chunk.data, "pgen")?;
            }
            b"inst" => {
                seen[3] = true;
                hydra.inst = riff::records(chunk.data, INST_SIZE, "inst")?
                    .map(|mut r| {
                        r.skip(20);
                        InstrumentHeader {
                            bag: r.u16() as usize,
                        }
                    })
                    .collect();
            }
            b"ibag" => {
                seen[4] = true;
                hydra.ibag = read_bags(chunk.data, "ibag")?;
            }
            b"igen" => {
                seen[5] = true;
                hydra.igen = read_generators(chunk.data, "igen")?;
            }
            b"shdr" => {
                seen[6] = true;
                hydra.shdr = riff::records(chunk.data, SHDR_SIZE, "shdr")?
                    .map(|mut r| {
                        r.skip(20);
                        let start = r.u32();
                        let end = r.u32();
                        let loop_start = r.u32();
                        let loop_end = r.u32();
                        let sample_rate = r.u32();
                        let original_pitch = r.u8();
                        let pitch_correction = r.i8();
                        SampleHeader {
                            start,
                            end,
                            loop_start,
                            loop_end,
                            sample_rate,
                            original_pitch,
                            pitch_correction,
                        }
                    })
                    .collect();
            }
            _ => {} // pmod/imod: modulators are not interpreted
        }
    }

    const NAMES: [&str; 7] = ["phdr", "pbag", "pgen", "inst", "ibag", "igen", "shdr"];
    if let Some(i) = seen.iter().position(|s| !s) {
        return Err(Error::invalid_file(format!("missing '{}' chunk", NAMES[i])));
    }
    // Every array needs its terminal record
    if hydra.phdr.is_empty()
        || hydra.pbag.is_empty()
        || hydra.inst.is_empty()
        || hydra.ibag.is_empty()
        || hydra.shdr.is_empty()
    {
        return Err(Error::invalid_file("missing terminal hydra record"));
    }
    Ok(hydra)
}

/// Splits the bags `first..last` into a global zone and the local zones
/// that end with the `terminal` generator.
fn collect_zones(
    bags: &[usize],
    gens: &[Generator],
    first: usize,
    last: usize,
    terminal: u16,
) -> Result<(GeneratorSet, Vec<GeneratorSet>)> {
    if first > last || last >= bags.len() {
        return Err(Error::invalid_file("bag index out of range"));
    }

    let mut global = GeneratorSet::default();
    let mut locals = Vec::new();
    for bag in first..last {
        let (g0, g1) = (bags[bag], bags[bag + 1]);
        if g0 > g1 || g1 > gens.len() {
            return Err(Error::invalid_file("generator index out of range"));
        }

        let mut set = GeneratorSet::default();
        for gen in &gens[g0..g1] {
            set.set(gen.oper, gen.amount);
            // Generators after the terminal one are ignored
            if gen.oper == terminal {
                break;
            }
        }

        if set.get(terminal).is_some() {
            locals.push(set);
        } else if bag == first {
            global = set;
        }
    }
    Ok((global, locals))
}

fn intersect(a: (u8, u8), b: (u8, u8)) -> Option<(u8, u8)> {
    let lo = a.0.max(b.0);
    let hi = a.1.min(b.1).min(127);
    (lo <= hi).then_some((lo, hi))
}

fn timecents_to_seconds(timecents: i32) -> f32 {
    2f32.powf(timecents.clamp(-12000, 8000) as f32 / 1200.0)
}

fn build_presets(hydra: &Hydra, sample_count: usize) -> Result<Vec<Preset>> {
    let mut presets = Vec::new();
    presets.try_reserve_exact(hydra.phdr.len() - 1)?;

    for pair in hydra.phdr.windows(2) {
        let header = &pair[0];
        let (preset_global, preset_zones) =
            collect_zones(&hydra.pbag, &hydra.pgen, header.bag, pair[1].bag, INSTRUMENT)?;

        let mut zones = Vec::new();
        for local in &preset_zones {
            let pz = local.over(&preset_global);
            let inst_index = pz.index(INSTRUMENT).unwrap_or(usize::MAX);
            if inst_index + 1 >= hydra.inst.len() {
                return Err(Error::invalid_file(format!(
                    "preset '{}' references missing instrument {}",
                    header.name, inst_index
                )));
            }

            let (inst_global, inst_zones) = collect_zones(
                &hydra.ibag,
                &hydra.igen,
                hydra.inst[inst_index].bag,
                hydra.inst[inst_index + 1].bag,
                SAMPLE_ID,
            )?;

            for inst_local in &inst_zones {
                let iz = inst_local.over(&inst_global);
                if let Some(zone) = build_zone(&pz, &iz, hydra, sample_count)? {
                    zones.push(zone);
                } else {
                    tracing::warn!(preset = %header.name, "Dropping zone that can never sound");
                }
            }
        }

        presets.push(Preset {
            name: header.name.clone(),
            bank: header.bank,
            program: header.program,
            zones,
        });
    }
    Ok(presets)
}

/// Combines one preset zone with one instrument zone.
///
/// Returns `Ok(None)` for zones that can never sound (disjoint ranges or an
/// empty sample).
fn build_zone(
    pz: &GeneratorSet,
    iz: &GeneratorSet,
    hydra: &Hydra,
    sample_count: usize,
) -> Result<Option<Zone>> {
    let (Some((key_lo, key_hi)), Some((vel_lo, vel_hi))) = (
        intersect(pz.range(KEY_RANGE), iz.range(KEY_RANGE)),
        intersect(pz.range(VEL_RANGE), iz.range(VEL_RANGE)),
    ) else {
        return Ok(None);
    };

    let sample_index = iz.index(SAMPLE_ID).unwrap_or(usize::MAX);
    if sample_index + 1 >= hydra.shdr.len() {
        return Err(Error::invalid_file(format!(
            "instrument references missing sample {}",
            sample_index
        )));
    }
    let header = &hydra.shdr[sample_index];

    // Address offsets are instrument-level only
    let offset = |fine: u16, coarse: u16| -> i64 {
        iz.value(fine, 0) as i64 + 32768 * iz.value(coarse, 0) as i64
    };
    let clamp = |v: i64| v.clamp(0, sample_count as i64) as u32;
    let start = clamp(header.start as i64 + offset(START_ADDRS_OFFSET, START_ADDRS_COARSE_OFFSET));
    let end = clamp(header.end as i64 + offset(END_ADDRS_OFFSET, END_ADDRS_COARSE_OFFSET));
    let loop_start = clamp(
        header.loop_start as i64 + offset(STARTLOOP_ADDRS_OFFSET, STARTLOOP_ADDRS_COARSE_OFFSET),
    );
    let loop_end =
        clamp(header.loop_end as i64 + offset(ENDLOOP_ADDRS_OFFSET, ENDLOOP_ADDRS_COARSE_OFFSET));
    if start >= end {
        return Ok(None);
    }

    let mut loop_mode = match iz.value(SAMPLE_MODES, 0) & 3 {
        1 => LoopMode::Continuous,
        3 => LoopMode::UntilRelease,
        _ => LoopMode::None,
    };
    if loop_mode != LoopMode::None && !(start <= loop_start && loop_start < loop_end && loop_end <= end) {
        loop_mode = LoopMode::None;
    }

    let root_key = match iz.value(OVERRIDING_ROOT_KEY, -1) {
        key @ 0..=127 => key as u8,
        _ if header.original_pitch <= 127 => header.original_pitch,
        _ => 60,
    };

    // Preset-level values are offsets added to the instrument values
    let sum = |oper: u16, default: i32| iz.value(oper, default) + pz.value(oper, 0);
    let tune = sum(COARSE_TUNE, 0) * 100 + sum(FINE_TUNE, 0) + header.pitch_correction as i32;
    let sustain_cb = sum(SUSTAIN_VOL_ENV, 0).clamp(0, 1440);

    Ok(Some(Zone {
        key_lo,
        key_hi,
        vel_lo,
        vel_hi,
        sample: SampleRegion {
            start,
            end,
            loop_start,
            loop_end,
            loop_mode,
            sample_rate: header.sample_rate.max(1),
        },
        root_key,
        tune: tune as f32,
        key_tracking: sum(SCALE_TUNING, 100) as f32,
        attenuation: sum(INITIAL_ATTENUATION, 0).clamp(0, 1440) as f32 / 10.0,
        pan: (sum(PAN, 0) as f32 / 1000.0).clamp(-0.5, 0.5),
        envelope: EnvelopeParams {
            attack: timecents_to_seconds(sum(ATTACK_VOL_ENV, DEFAULT_TIMECENTS)),
            decay: timecents_to_seconds(sum(DECAY_VOL_ENV, DEFAULT_TIMECENTS)),
            sustain: 10f32.powf(-(sustain_cb as f32) / 200.0),
            release: timecents_to_seconds(sum(RELEASE_VOL_ENV, DEFAULT_TIMECENTS)),
        },
    }))
}
