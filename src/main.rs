//! tinymidi - play or export MIDI files through a SoundFont.
//!
//! # Usage
//!
//! ```bash
//! tinymidi bank.sf2 song.mid                  # play (with the `playback` feature)
//! tinymidi bank.sf2 song.mid | aplay -f FLOAT_LE -c 2 -r 44100
//! tinymidi bank.sf2 song.mid --wav song.wav   # export to WAV
//! tinymidi bank.sf2 *.mid --out-dir renders   # export many songs in parallel
//! tinymidi bank.sf2 --info                    # list presets
//! ```
//!
//! Without the `playback` feature, songs that are not exported are written
//! to stdout as raw native-endian `f32` PCM.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tinymidi::audio::{export_batch, export_to_wav, BatchJob};
use tinymidi::{Engine, Handle, PlayerConfig};

/// Command-line options for the application.
#[derive(Default)]
struct CliOptions {
    /// Path to the SoundFont file.
    soundfont: Option<PathBuf>,
    /// MIDI files to play or export.
    midi: Vec<PathBuf>,
    /// Export the song to this WAV file instead of playing it.
    wav: Option<PathBuf>,
    /// Export every song into this directory.
    out_dir: Option<PathBuf>,
    /// JSON player configuration.
    config: Option<PathBuf>,
    looping: bool,
    mono: bool,
    voices: Option<usize>,
    gain: Option<f32>,
    /// Print soundfont and song information.
    info: bool,
}

fn print_help(program: &str) {
    eprintln!("tinymidi - MIDI to PCM synthesizer");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] [SOUNDFONT.sf2] [SONG.mid ...]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -sf, --soundfont PATH  Load a specific SoundFont file (.sf2)");
    eprintln!("  -w, --wav PATH         Export the song to a WAV file");
    eprintln!("  -o, --out-dir DIR      Export all songs to WAV files in DIR");
    eprintln!("  -c, --config PATH      Load player settings from a JSON file");
    eprintln!("  -l, --loop             Loop the song");
    eprintln!("      --mono             Render mono output");
    eprintln!("      --voices N         Limit simultaneous voices (0 = unlimited)");
    eprintln!("      --gain G           Global output gain");
    eprintln!("  -i, --info             Print presets and song length");
    eprintln!("  -h, --help             Print this help message");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("tinymidi");
        let mut options = Self::default();
        let mut i = 1;

        // Returns the value following an option
        let value = |i: &mut usize, name: &str| -> Result<String> {
            *i += 1;
            match args.get(*i) {
                Some(v) => Ok(v.clone()),
                None => bail!("{} requires an argument", name),
            }
        };

        while i < args.len() {
            match args[i].as_str() {
                "--soundfont" | "-sf" => options.soundfont = Some(PathBuf::from(value(&mut i, "--soundfont")?)),
                "--wav" | "-w" => options.wav = Some(PathBuf::from(value(&mut i, "--wav")?)),
                "--out-dir" | "-o" => options.out_dir = Some(PathBuf::from(value(&mut i, "--out-dir")?)),
                "--config" | "-c" => options.config = Some(PathBuf::from(value(&mut i, "--config")?)),
                "--loop" | "-l" => options.looping = true,
                "--mono" => options.mono = true,
                "--voices" => {
                    let v = value(&mut i, "--voices")?;
                    options.voices = Some(v.parse().with_context(|| format!("Invalid voice count: {}", v))?);
                }
                "--gain" => {
                    let v = value(&mut i, "--gain")?;
                    options.gain = Some(v.parse().with_context(|| format!("Invalid gain: {}", v))?);
                }
                "--info" | "-i" => options.info = true,
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other => {
                    let lower = other.to_ascii_lowercase();
                    if lower.ends_with(".sf2") {
                        options.soundfont = Some(PathBuf::from(other));
                    } else if lower.ends_with(".mid") || lower.ends_with(".midi") {
                        options.midi.push(PathBuf::from(other));
                    } else {
                        eprintln!("Unknown option: {}", other);
                        eprintln!("Use --help for usage information");
                        std::process::exit(1);
                    }
                }
            }
            i += 1;
        }

        Ok(options)
    }

    /// Merges the command line over the configuration file.
    fn apply(&self, config: &mut PlayerConfig) {
        if let Some(ref path) = self.soundfont {
            config.soundfont = Some(path.clone());
        }
        if self.looping {
            config.stream.looping = true;
        }
        if self.mono {
            config.stream.stereo = false;
        }
        if let Some(voices) = self.voices {
            config.stream.max_voices = voices;
        }
        if let Some(gain) = self.gain {
            config.gain = gain;
        }
    }
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.config {
        Some(ref path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    cli.apply(&mut config);

    let soundfont_path = config
        .soundfont
        .clone()
        .context("No SoundFont given (pass a .sf2 file or set it in the config)")?;
    let bytes = fs::read(&soundfont_path)
        .with_context(|| format!("Failed to read SoundFont: {}", soundfont_path.display()))?;

    let mut engine = Engine::new();
    let sf = engine
        .load_soundfont(&bytes)
        .with_context(|| format!("Failed to load SoundFont: {}", soundfont_path.display()))?;

    if cli.info {
        print_soundfont_info(&engine, sf)?;
        if cli.midi.is_empty() {
            return Ok(());
        }
    }

    if let Some(ref out_dir) = cli.out_dir {
        return export_all(&engine, sf, &cli.midi, out_dir, &config);
    }

    let midi_path = match cli.midi.as_slice() {
        [path] => path,
        [] => bail!("No MIDI file given"),
        _ => bail!("Several MIDI files given; use --out-dir to export them all"),
    };

    if let Some(ref wav) = cli.wav {
        let soundfont = Arc::clone(engine.soundfont(sf)?);
        let frames = export_to_wav(
            midi_path,
            soundfont,
            wav,
            config.stream,
            config.gain,
            Some(|p: f32| eprint!("\rExporting... {:3.0}%", p * 100.0)),
        )?;
        eprintln!();
        eprintln!(
            "Wrote {} ({:.1} s)",
            wav.display(),
            frames as f64 / config.stream.sample_rate as f64
        );
        return Ok(());
    }

    let midi = fs::read(midi_path).with_context(|| format!("Failed to read MIDI file: {}", midi_path.display()))?;
    let song = engine
        .open_stream(&midi, sf, config.stream)
        .with_context(|| format!("Failed to open MIDI file: {}", midi_path.display()))?;
    engine.set_global_gain(song, config.gain)?;

    if cli.info {
        eprintln!(
            "{}: {:.1} s",
            midi_path.display(),
            engine.millisecond_length(song)? / 1000.0
        );
    }

    play_stream(engine, song)
}

fn print_soundfont_info(engine: &Engine, sf: Handle) -> Result<()> {
    let soundfont = engine.soundfont(sf)?;
    println!("{} presets", soundfont.preset_count());
    for (index, preset) in soundfont.presets().iter().enumerate() {
        println!(
            "{:4}  bank {:3}  program {:3}  {}",
            index,
            preset.bank(),
            preset.program(),
            preset.name()
        );
    }
    Ok(())
}

fn export_all(engine: &Engine, sf: Handle, midi: &[PathBuf], out_dir: &Path, config: &PlayerConfig) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

    let jobs: Vec<BatchJob> = midi
        .iter()
        .map(|path| BatchJob {
            midi_path: path.clone(),
            output_path: out_dir.join(path.file_stem().unwrap_or_default()).with_extension("wav"),
        })
        .collect();

    let results = export_batch(&jobs, Arc::clone(engine.soundfont(sf)?), config.stream, config.gain);
    let mut failed = 0;
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(frames) => eprintln!(
                "{} -> {} ({:.1} s)",
                job.midi_path.display(),
                job.output_path.display(),
                frames as f64 / config.stream.sample_rate as f64
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {:#}", job.midi_path.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} exports failed", failed, jobs.len());
    }
    Ok(())
}

/// Plays the stream on the default audio device until it has faded out.
#[cfg(feature = "playback")]
fn play_stream(engine: Engine, song: Handle) -> Result<()> {
    use std::sync::Mutex;

    let engine = Arc::new(Mutex::new(engine));
    let player = tinymidi::audio::playback::play(engine, song)?;
    player.wait();
    Ok(())
}

/// Writes the stream to stdout as raw `f32` PCM.
#[cfg(not(feature = "playback"))]
fn play_stream(mut engine: Engine, song: Handle) -> Result<()> {
    use std::io;
    use tinymidi::StreamReader;

    let mut reader = StreamReader::new(engine.stream_mut(song)?);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut reader, &mut out).context("Failed to write PCM to stdout")?;
    Ok(())
}
