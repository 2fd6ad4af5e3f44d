use clap::{Parser, Subcommand};
use codec_client::{load_avc_engine, load_mp3_engine};
use codec_lib::codec_types::{BufferFlags, BufferHeader, BufferTag, ComponentEvent, PortIndex};
use codec_lib::mp3::header;
use codec_lib::{
    AvcDecoder, AvcDecoderOptions, Codec, Component, ComponentHost, HeapAllocator, Mp3Decoder,
    Mp3DecoderOptions,
};
use std::env;
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

mod split;

const DEFAULT_AVC_ENGINE: &str = "libomx_avcdec_hw_sprd.so";
const DEFAULT_MP3_ENGINE: &str = "libomx_mp3dec_sprd.so";
/// Output tags start here so they never collide with input tags.
const OUTPUT_TAG_BASE: u64 = 1 << 32;

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Decode an Annex B H.264 stream to raw YUV 4:2:0.
    DecodeAvc {
        input: PathBuf,
        output: PathBuf,
        /// Defaults to $AVC_ENGINE_LIB, then the vendor library name.
        #[arg(long)]
        engine_lib: Option<PathBuf>,
        #[arg(long, default_value_t = 8)]
        output_buffers: usize,
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
    /// Decode an MP3 stream to interleaved 16-bit PCM.
    DecodeMp3 {
        input: PathBuf,
        output: PathBuf,
        /// Defaults to $MP3_ENGINE_LIB, then the vendor library name.
        #[arg(long)]
        engine_lib: Option<PathBuf>,
        #[arg(long, default_value_t = 4)]
        output_buffers: usize,
    },
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Writes every filled output buffer to a file and hands the buffers back to
/// the driver for requeueing.
struct FileHost {
    writer: BufWriter<File>,
    returned: Vec<BufferHeader>,
    events: Vec<ComponentEvent>,
    end_of_stream: bool,
    bytes_written: usize,
    write_error: Option<std::io::Error>,
}

impl FileHost {
    fn create(path: &Path) -> Result<Self, std::io::Error> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            returned: Vec::new(),
            events: Vec::new(),
            end_of_stream: false,
            bytes_written: 0,
            write_error: None,
        })
    }
}

impl ComponentHost for FileHost {
    fn empty_buffer_done(&mut self, buffer: BufferHeader) {
        log::trace!("Input {:?} consumed", buffer.tag);
    }

    fn fill_buffer_done(&mut self, buffer: BufferHeader) {
        let payload = buffer.payload();
        if !payload.is_empty() && self.write_error.is_none() {
            match self.writer.write_all(payload) {
                Ok(()) => self.bytes_written += payload.len(),
                Err(e) => self.write_error = Some(e),
            }
        }
        if buffer.is_eos() {
            self.end_of_stream = true;
        }
        self.returned.push(buffer);
    }

    fn notify(&mut self, event: ComponentEvent) {
        self.events.push(event);
    }
}

/// Feeds units into a component and keeps its output port stocked.
struct Session<C: Codec> {
    component: Component<C, FileHost>,
    output_buffers: usize,
    output_size: fn(&C) -> usize,
    next_tag: u64,
}

impl<C: Codec> Session<C> {
    fn new(codec: C, host: FileHost, output_buffers: usize, output_size: fn(&C) -> usize) -> Self {
        Self {
            component: Component::new(codec, host),
            output_buffers,
            output_size,
            next_tag: OUTPUT_TAG_BASE,
        }
    }

    fn allocate_outputs(&mut self) -> Result<(), Box<dyn Error>> {
        let size = (self.output_size)(self.component.codec());
        log::debug!("Allocating {} output buffers of {} bytes", self.output_buffers, size);
        for _ in 0..self.output_buffers {
            let buffer = BufferHeader::output(BufferTag::new(self.next_tag), size);
            self.next_tag += 1;
            self.component.fill_this_buffer(buffer)?;
        }
        Ok(())
    }

    fn reconfigure(&mut self, port: PortIndex) -> Result<(), Box<dyn Error>> {
        log::info!("Reallocating {} port buffers", port);
        self.component.disable_port(port);
        self.component.host_mut().returned.clear();
        self.component.enable_port(port);
        self.allocate_outputs()
    }

    /// Handles events and requeues returned outputs until the component goes
    /// quiet. Returns whether anything happened.
    fn service(&mut self) -> Result<bool, Box<dyn Error>> {
        let mut progressed = false;
        loop {
            let events = std::mem::take(&mut self.component.host_mut().events);
            for event in events {
                match event {
                    ComponentEvent::Error(e) => return Err(e.into()),
                    ComponentEvent::PortSettingsChanged {
                        config: Some(index),
                        ..
                    } => log::info!("Output config {:?} changed", index),
                    ComponentEvent::PortSettingsChanged { port, config: None } => {
                        self.reconfigure(port)?;
                        progressed = true;
                    }
                }
            }
            if let Some(e) = self.component.host_mut().write_error.take() {
                return Err(e.into());
            }

            let returned = std::mem::take(&mut self.component.host_mut().returned);
            if returned.is_empty() || self.component.host().end_of_stream {
                break;
            }
            for mut buffer in returned {
                buffer.offset = 0;
                buffer.filled_len = 0;
                buffer.flags = BufferFlags::empty();
                self.component.fill_this_buffer(buffer)?;
            }
            progressed = true;
        }
        Ok(progressed)
    }

    fn run(mut self, units: Vec<(split::Unit<'_>, i64)>) -> Result<usize, Box<dyn Error>> {
        self.allocate_outputs()?;
        for (i, (unit, timestamp)) in units.into_iter().enumerate() {
            let tag = BufferTag::new(i as u64);
            let buffer = BufferHeader::with_payload(tag, unit.data, timestamp, unit.flags);
            self.component.empty_this_buffer(buffer)?;
            self.service()?;
        }

        let eos_tag = BufferTag::new(OUTPUT_TAG_BASE - 1);
        let eos = BufferHeader::with_payload(eos_tag, &[], 0, BufferFlags::EOS);
        self.component.empty_this_buffer(eos)?;
        while !self.component.host().end_of_stream {
            if !self.service()? {
                log::warn!("Decoder stalled before the end of the stream");
                break;
            }
        }

        let host = self.component.host_mut();
        host.writer.flush()?;
        Ok(host.bytes_written)
    }
}

fn engine_path(arg: Option<PathBuf>, var: &str, default: &str) -> PathBuf {
    arg.or_else(|| env::var(var).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

fn decode_avc(
    input: PathBuf,
    output: PathBuf,
    engine_lib: Option<PathBuf>,
    output_buffers: usize,
    fps: u32,
) -> Result<usize, Box<dyn Error>> {
    let stream = fs::read(&input)?;
    let frame_duration = 1_000_000 / i64::from(fps.max(1));
    let mut pictures = 0;
    let units: Vec<_> = split::split_avc(&stream)
        .into_iter()
        .map(|unit| {
            if unit.flags.contains(BufferFlags::CODEC_CONFIG) {
                return (unit, 0);
            }
            let timestamp = pictures * frame_duration;
            pictures += 1;
            (unit, timestamp)
        })
        .collect();
    println!("Decoding {} access units from {}", units.len(), input.display());

    let engine = load_avc_engine(&engine_path(engine_lib, "AVC_ENGINE_LIB", DEFAULT_AVC_ENGINE))?;
    let decoder = AvcDecoder::new(
        engine,
        Box::new(HeapAllocator::default()),
        AvcDecoderOptions::default(),
    )?;
    let session = Session::new(decoder, FileHost::create(&output)?, output_buffers, |decoder| {
        decoder.port_definition(PortIndex::Output).buffer_size
    });
    session.run(units)
}

fn decode_mp3(
    input: PathBuf,
    output: PathBuf,
    engine_lib: Option<PathBuf>,
    output_buffers: usize,
) -> Result<usize, Box<dyn Error>> {
    let stream = fs::read(&input)?;
    let frames = split::split_mp3(&stream);
    println!("Decoding {} frames from {}", frames.len(), input.display());

    let mut options = Mp3DecoderOptions::default();
    if let Some(first) = frames.first() {
        options.channels = header::channels(first.data).unwrap_or(options.channels);
        options.sample_rate = header::sample_rate(first.data).unwrap_or(options.sample_rate);
    }
    let sample_rate = i64::from(options.sample_rate);
    let units = frames
        .into_iter()
        .enumerate()
        .map(|(i, unit)| (unit, i as i64 * 1152 * 1_000_000 / sample_rate))
        .collect();

    let engine = load_mp3_engine(&engine_path(engine_lib, "MP3_ENGINE_LIB", DEFAULT_MP3_ENGINE))?;
    let decoder = Mp3Decoder::new(engine, options)?;
    let session = Session::new(decoder, FileHost::create(&output)?, output_buffers, |decoder| {
        decoder.port_definition(PortIndex::Output).buffer_size
    });
    session.run(units)
}

fn main() {
    codec_lib::init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::DecodeAvc {
            input,
            output,
            engine_lib,
            output_buffers,
            fps,
        } => decode_avc(input, output, engine_lib, output_buffers, fps),
        Command::DecodeMp3 {
            input,
            output,
            engine_lib,
            output_buffers,
        } => decode_mp3(input, output, engine_lib, output_buffers),
    };

    match result {
        Ok(bytes) => println!("Wrote {} bytes", bytes),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
