//! In-memory SoundFont and MIDI file builders for unit tests.

/// Length of the looped test waveform in samples.
const WAVE_LEN: usize = 64;

/// Zero padding SF2 requires after each sample.
const SAMPLE_GUARD: usize = 46;

/// One preset of a generated test bank. Each preset gets its own instrument
/// playing the shared looped sine wave over the full key range.
#[derive(Debug, Clone)]
pub struct TestPreset {
    pub name: &'static str,
    pub bank: u16,
    pub program: u16,
    /// Release time in timecents (-1200 = 0.5 s).
    pub release: i16,
    /// Sustain attenuation in centibels.
    pub sustain: i16,
    /// Key range as (lo, hi).
    pub keys: (u8, u8),
}

impl TestPreset {
    pub fn new(name: &'static str, bank: u16, program: u16) -> Self {
        Self {
            name,
            bank,
            program,
            release: -2400,
            sustain: 0,
            keys: (0, 127),
        }
    }

    pub fn with_release(mut self, timecents: i16) -> Self {
        self.release = timecents;
        self
    }

    pub fn with_sustain(mut self, centibels: i16) -> Self {
        self.sustain = centibels;
        self
    }

    pub fn with_keys(mut self, lo: u8, hi: u8) -> Self {
        self.keys = (lo, hi);
        self
    }
}

fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(kind: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = kind.to_vec();
    for c in chunks {
        body.extend_from_slice(c);
    }
    chunk(b"LIST", &body)
}

fn name20(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (dst, src) in out.iter_mut().zip(name.bytes().take(19)) {
        *dst = src;
    }
    out
}

fn gen(out: &mut Vec<u8>, oper: u16, amount: [u8; 2]) {
    out.extend_from_slice(&oper.to_le_bytes());
    out.extend_from_slice(&amount);
}

/// Builds a complete SF2 file containing the given presets.
pub fn soundfont_bytes(presets: &[TestPreset]) -> Vec<u8> {
    // Sample pool: one looped sine cycle followed by the guard
    let mut smpl = Vec::new();
    for i in 0..WAVE_LEN {
        let phase = i as f32 / WAVE_LEN as f32 * std::f32::consts::TAU;
        let value = (phase.sin() * 16000.0) as i16;
        smpl.extend_from_slice(&value.to_le_bytes());
    }
    smpl.extend(std::iter::repeat(0u8).take(SAMPLE_GUARD * 2));

    let mut phdr = Vec::new();
    let mut pbag = Vec::new();
    let mut pgen = Vec::new();
    let mut inst = Vec::new();
    let mut ibag = Vec::new();
    let mut igen = Vec::new();

    const INSTRUMENT_GENS: u16 = 6;
    for (i, p) in presets.iter().enumerate() {
        let i = i as u16;
        phdr.extend_from_slice(&name20(p.name));
        phdr.extend_from_slice(&p.program.to_le_bytes());
        phdr.extend_from_slice(&p.bank.to_le_bytes());
        phdr.extend_from_slice(&i.to_le_bytes());
        phdr.extend_from_slice(&[0u8; 12]);

        pbag.extend_from_slice(&i.to_le_bytes());
        pbag.extend_from_slice(&0u16.to_le_bytes());
        gen(&mut pgen, 41, i.to_le_bytes());

        inst.extend_from_slice(&name20(p.name));
        inst.extend_from_slice(&i.to_le_bytes());

        ibag.extend_from_slice(&(i * INSTRUMENT_GENS).to_le_bytes());
        ibag.extend_from_slice(&0u16.to_le_bytes());
        gen(&mut igen, 43, [p.keys.0, p.keys.1]);
        gen(&mut igen, 34, (-7200i16).to_le_bytes());
        gen(&mut igen, 37, p.sustain.to_le_bytes());
        gen(&mut igen, 38, p.release.to_le_bytes());
        gen(&mut igen, 54, 1u16.to_le_bytes());
        gen(&mut igen, 53, 0u16.to_le_bytes());
    }

    let count = presets.len() as u16;
    // Terminal records
    phdr.extend_from_slice(&name20("EOP"));
    phdr.extend_from_slice(&[0u8; 4]);
    phdr.extend_from_slice(&count.to_le_bytes());
    phdr.extend_from_slice(&[0u8; 12]);
    pbag.extend_from_slice(&count.to_le_bytes());
    pbag.extend_from_slice(&0u16.to_le_bytes());
    gen(&mut pgen, 0, [0, 0]);
    inst.extend_from_slice(&name20("EOI"));
    inst.extend_from_slice(&count.to_le_bytes());
    ibag.extend_from_slice(&(count * INSTRUMENT_GENS).to_le_bytes());
    ibag.extend_from_slice(&0u16.to_le_bytes());
    gen(&mut igen, 0, [0, 0]);

    let mut shdr = Vec::new();
    shdr.extend_from_slice(&name20("Sine"));
    for value in [0u32, WAVE_LEN as u32, 0, WAVE_LEN as u32, 44100] {
        shdr.extend_from_slice(&value.to_le_bytes());
    }
    shdr.push(60); // original pitch
    shdr.push(0); // pitch correction
    shdr.extend_from_slice(&0u16.to_le_bytes()); // sample link
    shdr.extend_from_slice(&1u16.to_le_bytes()); // mono sample
    shdr.extend_from_slice(&name20("EOS"));
    shdr.extend_from_slice(&[0u8; 26]);

    let info = list(
        b"INFO",
        &[chunk(b"ifil", &[2, 0, 1, 0]), chunk(b"INAM", b"Test Bank\0")],
    );
    let sdta = list(b"sdta", &[chunk(b"smpl", &smpl)]);
    let pdta = list(
        b"pdta",
        &[
            chunk(b"phdr", &phdr),
            chunk(b"pbag", &pbag),
            chunk(b"pmod", &[0u8; 10]),
            chunk(b"pgen", &pgen),
            chunk(b"inst", &inst),
            chunk(b"ibag", &ibag),
            chunk(b"imod", &[0u8; 10]),
            chunk(b"igen", &igen),
            chunk(b"shdr", &shdr),
        ],
    );

    let mut body = b"sfbk".to_vec();
    body.extend(info);
    body.extend(sdta);
    body.extend(pdta);
    chunk(b"RIFF", &body)
}

/// Writes a variable-length quantity as used for MIDI delta times.
fn write_vlq(value: u32, out: &mut Vec<u8>) {
    let mut bytes = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        bytes.push((rest & 0x7F) as u8 | 0x80);
        rest >>= 7;
    }
    out.extend(bytes.iter().rev());
}

/// Builds a Standard MIDI File from tracks of `(delta_ticks, message bytes)`.
/// An end-of-track meta event is appended to every track.
pub fn midi_bytes(format: u16, division: u16, tracks: &[Vec<(u32, Vec<u8>)>]) -> Vec<u8> {
    let mut out = b"MThd".to_vec();
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());

    for track in tracks {
        let mut data = Vec::new();
        for (delta, message) in track {
            write_vlq(*delta, &mut data);
            data.extend_from_slice(message);
        }
        data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend(data);
    }
    out
}

/// Format 0 song at 480 ticks per beat and the default 120 BPM: a single
/// middle C held for `ticks` (960 ticks = one second).
pub fn single_note_song(ticks: u32) -> Vec<u8> {
    midi_bytes(
        0,
        480,
        &[vec![(0, vec![0x90, 60, 100]), (ticks, vec![0x80, 60, 0])]],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq() {
        let mut out = Vec::new();
        write_vlq(0, &mut out);
        write_vlq(127, &mut out);
        write_vlq(960, &mut out);
        write_vlq(0x4000, &mut out);
        assert_eq!(out, vec![0x00, 0x7F, 0x87, 0x40, 0x81, 0x80, 0x00]);
    }
}
