//! Audio export functionality.
//!
//! Renders songs to 16-bit WAV files. Several songs sharing one soundfont
//! can be exported in parallel with [`export_batch`].

use super::to_i16;
use crate::config::StreamSettings;
use crate::soundfont::Soundfont;
use crate::stream::Stream;
use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Buffer size for rendering chunks, in frames.
/// Larger buffers are more efficient but use more memory.
const RENDER_BUFFER_SIZE: usize = 4096;

/// Renders a stream to the end and writes it as WAV.
///
/// Rendering continues after the song ends until every voice has faded
/// out, so release tails are kept.
///
/// # Arguments
///
/// * `stream` - A non-looping stream
/// * `writer` - Destination for the WAV data
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Returns
///
/// The number of frames written
///
/// # Errors
///
/// Returns error if the stream loops or writing fails
pub fn render_to_wav<W, F>(stream: &mut Stream, writer: W, mut progress_callback: Option<F>) -> Result<usize>
where
    W: Write + Seek,
    F: FnMut(f32),
{
    let settings = *stream.settings();
    if settings.looping {
        bail!("Cannot export a looping stream");
    }

    let spec = WavSpec {
        channels: settings.channels(),
        sample_rate: settings.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut wav = WavWriter::new(writer, spec).context("Failed to write WAV header")?;

    // Progress is measured against the song length; the release tail is
    // reported as complete
    let expected_frames = (stream.millisecond_length() * settings.sample_rate as f64 / 1000.0).max(1.0);
    let width = settings.frame_size();
    let mut buffer = vec![0.0f32; RENDER_BUFFER_SIZE * width];
    let mut frames = 0usize;

    loop {
        let rendered = stream.render(&mut buffer, RENDER_BUFFER_SIZE);
        if rendered == 0 {
            break;
        }
        for sample in &buffer[..rendered * width] {
            wav.write_sample(to_i16(*sample))?;
        }
        frames += rendered;

        if let Some(ref mut callback) = progress_callback {
            callback((frames as f64 / expected_frames).min(1.0) as f32);
        }
    }

    wav.finalize().context("Failed to finalize WAV file")?;
    if let Some(ref mut callback) = progress_callback {
        callback(1.0);
    }

    Ok(frames)
}

fn open_export_stream(midi_path: &Path, soundfont: Arc<Soundfont>, settings: StreamSettings, gain: f32) -> Result<Stream> {
    let midi = fs::read(midi_path)
        .with_context(|| format!("Failed to read MIDI file: {}", midi_path.display()))?;
    let settings = StreamSettings {
        looping: false,
        ..settings
    };
    let mut stream = Stream::open(&midi, soundfont, settings)
        .with_context(|| format!("Failed to open MIDI file: {}", midi_path.display()))?;
    stream.set_global_gain(gain);
    Ok(stream)
}

fn create_wav(output_path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output WAV file: {}", output_path.display()))?;
    Ok(BufWriter::new(file))
}

/// Exports a MIDI file to a WAV file.
///
/// # Arguments
///
/// * `midi_path` - Path to the MIDI file
/// * `soundfont` - The soundfont to render with
/// * `output_path` - Path for the output WAV file
/// * `settings` - Output format; looping is ignored
/// * `gain` - Global gain applied to the stream
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Errors
///
/// Returns error if:
/// - The MIDI file cannot be read or parsed
/// - Output file cannot be created
/// - Writing fails
pub fn export_to_wav<P1, P2, F>(
    midi_path: P1,
    soundfont: Arc<Soundfont>,
    output_path: P2,
    settings: StreamSettings,
    gain: f32,
    progress_callback: Option<F>,
) -> Result<usize>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>,
    F: FnMut(f32),
{
    let mut stream = open_export_stream(midi_path.as_ref(), soundfont, settings, gain)?;
    let writer = create_wav(output_path.as_ref())?;
    let frames = render_to_wav(&mut stream, writer, progress_callback)?;
    tracing::info!(
        output = %output_path.as_ref().display(),
        frames,
        "Exported WAV"
    );
    Ok(frames)
}

/// One song of a batch export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub midi_path: PathBuf,
    pub output_path: PathBuf,
}

/// Exports several MIDI files in parallel, all rendered with one soundfont.
///
/// # Returns
///
/// One result per job, in job order: the frames written or the error that
/// stopped that job. A failing job does not affect the others.
pub fn export_batch(
    jobs: &[BatchJob],
    soundfont: Arc<Soundfont>,
    settings: StreamSettings,
    gain: f32,
) -> Vec<Result<usize>> {
    jobs.par_iter()
        .map(|job| {
            let mut stream = open_export_stream(&job.midi_path, Arc::clone(&soundfont), settings, gain)?;
            let writer = create_wav(&job.output_path)?;
            render_to_wav(&mut stream, writer, None::<fn(f32)>)
                .with_context(|| format!("Failed to export {}", job.midi_path.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{single_note_song, soundfont_bytes, TestPreset};
    use std::io::Cursor;

    fn bank() -> Arc<Soundfont> {
        Arc::new(Soundfont::parse(&soundfont_bytes(&[TestPreset::new("Piano", 0, 0)])).unwrap())
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tinymidi-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_render_to_wav() {
        let mut stream = Stream::open(&single_note_song(960), bank(), StreamSettings::default()).unwrap();
        let mut progress = Vec::new();
        let mut cursor = Cursor::new(Vec::new());
        let frames = render_to_wav(&mut stream, &mut cursor, Some(|p: f32| progress.push(p))).unwrap();
        assert!(frames >= 44100);

        cursor.set_position(0);
        let reader = hound::WavReader::new(cursor).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len() as usize, frames * 2);

        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&1.0));
    }

    #[test]
    fn test_looping_stream_is_rejected() {
        let settings = StreamSettings {
            looping: true,
            ..StreamSettings::default()
        };
        let mut stream = Stream::open(&single_note_song(960), bank(), settings).unwrap();
        let result = render_to_wav(&mut stream, Cursor::new(Vec::new()), None::<fn(f32)>);
        assert!(result.is_err());
    }

    #[test]
    fn test_export_batch() {
        let dir = scratch_dir("batch");
        let song = dir.join("song.mid");
        fs::write(&song, single_note_song(480)).unwrap();

        let jobs = vec![
            BatchJob {
                midi_path: song.clone(),
                output_path: dir.join("a.wav"),
            },
            BatchJob {
                midi_path: dir.join("missing.mid"),
                output_path: dir.join("b.wav"),
            },
            BatchJob {
                midi_path: song,
                output_path: dir.join("c.wav"),
            },
        ];
        let mono = StreamSettings {
            stereo: false,
            ..StreamSettings::default()
        };
        let results = export_batch(&jobs, bank(), mono, 1.0);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[0].as_ref().unwrap(), results[2].as_ref().unwrap());

        let reader = hound::WavReader::open(dir.join("c.wav")).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert!(reader.len() >= 22050);

        fs::remove_dir_all(&dir).ok();
    }
}
