use codec_types::{
    BufferFlags, CodecError, ComponentEvent, Mp3Engine, Mp3FrameInput,
    PortDefinition, PortFormat, PortIndex, SessionState,
};

use super::header;
use super::{Mp3DecoderOptions, DECODER_DELAY, MP3_DEC_FRAME_LEN};
use crate::component::{Codec, ComponentHost, EosStatus, Ports};
use crate::port_settings::PortSettingsChange;

const BUFFER_COUNT: u32 = 4;
const INPUT_BUFFER_SIZE: usize = 8192;
const OUTPUT_BUFFER_SIZE: usize = 4608 * 2;
/// Largest frame kept for lookahead; a layer II frame at 384 kbps and 32 kHz fits.
const MAX_FRAME_LEN: usize = 2048;
const BYTES_PER_SAMPLE: usize = 2;
const ROLE: &str = "audio_decoder.mp3";

/// The frame held back until the one after it has been seen.
#[derive(Debug)]
struct PendingFrame {
    data: Vec<u8>,
    timestamp: i64,
    starts_buffer: bool,
}

enum Step {
    Continue,
    Stop,
}

/// MP3 decoder adapter driving an [`Mp3Engine`].
pub struct Mp3Decoder<E: Mp3Engine> {
    engine: E,
    channels: u32,
    sample_rate: u32,
    pad_end_of_stream: bool,
    lookahead: Option<PendingFrame>,
    left: Vec<i16>,
    right: Vec<i16>,
    anchor_time_us: i64,
    samples_output: u64,
    trim_bytes_remaining: usize,
    format_checked: bool,
    frames_decoded: u64,
    eos_status: EosStatus,
    port_settings: PortSettingsChange,
    signalled_error: bool,
}

impl<E: Mp3Engine> Mp3Decoder<E> {
    pub fn new(mut engine: E, options: Mp3DecoderOptions) -> Result<Self, CodecError> {
        validate_pcm(options.channels, options.sample_rate)
            .map_err(|e| CodecError::FatalConstruction(e.to_string()))?;
        engine
            .init()
            .map_err(|e| CodecError::FatalConstruction(format!("Engine init failed: {}", e)))?;
        log::info!(
            "MP3 engine initialised for {} Hz, {} channels",
            options.sample_rate,
            options.channels
        );
        Ok(Self {
            engine,
            channels: options.channels,
            sample_rate: options.sample_rate,
            pad_end_of_stream: options.pad_end_of_stream,
            lookahead: None,
            left: vec![0; MP3_DEC_FRAME_LEN],
            right: vec![0; MP3_DEC_FRAME_LEN],
            anchor_time_us: 0,
            samples_output: 0,
            trim_bytes_remaining: delay_bytes(options.channels),
            format_checked: false,
            frames_decoded: 0,
            eos_status: EosStatus::InputDataAvailable,
            port_settings: PortSettingsChange::None,
            signalled_error: false,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Channel count and sample rate of the PCM output.
    pub fn pcm_params(&self) -> (u32, u32) {
        (self.channels, self.sample_rate)
    }

    /// Declares the stream's format before decoding starts.
    pub fn set_mp3_params(&mut self, channels: u32, sample_rate: u32) -> Result<(), CodecError> {
        validate_pcm(channels, sample_rate)?;
        log::info!("MP3 params: {} channels, {} Hz", channels, sample_rate);
        self.channels = channels;
        self.sample_rate = sample_rate;
        if self.frames_decoded == 0 {
            self.trim_bytes_remaining = delay_bytes(channels);
        }
        Ok(())
    }

    pub fn set_role(&self, role: &str) -> Result<(), CodecError> {
        if role != ROLE {
            return Err(CodecError::InvalidParameter(format!(
                "Unsupported role {}",
                role
            )));
        }
        Ok(())
    }

    pub fn port_definition(&self, port: PortIndex) -> PortDefinition {
        match port {
            PortIndex::Input => PortDefinition {
                port,
                buffer_count_min: BUFFER_COUNT,
                buffer_count_actual: BUFFER_COUNT,
                buffer_size: INPUT_BUFFER_SIZE,
                format: PortFormat::Mp3,
            },
            PortIndex::Output => PortDefinition {
                port,
                buffer_count_min: BUFFER_COUNT,
                buffer_count_actual: BUFFER_COUNT,
                buffer_size: OUTPUT_BUFFER_SIZE,
                format: PortFormat::Pcm {
                    channels: self.channels,
                    sample_rate: self.sample_rate,
                },
            },
        }
    }

    pub fn session_state(&self) -> SessionState {
        if self.signalled_error {
            return SessionState::Error;
        }
        match self.port_settings {
            PortSettingsChange::AwaitingDisabled => SessionState::AwaitingPortDisable,
            PortSettingsChange::AwaitingEnabled => SessionState::AwaitingPortEnable,
            PortSettingsChange::None => match self.eos_status {
                EosStatus::InputEosSeen => SessionState::EosSeen,
                EosStatus::OutputFramesFlushed => SessionState::EosFlushed,
                EosStatus::InputDataAvailable if self.format_checked => SessionState::Decoding,
                EosStatus::InputDataAvailable => SessionState::HeadersNotDecoded,
            },
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    fn signal_error(&mut self, error: CodecError, host: &mut dyn ComponentHost) {
        log::error!("{}", error);
        self.signalled_error = true;
        host.notify(ComponentEvent::Error(error));
    }

    fn current_time_us(&self) -> i64 {
        self.anchor_time_us + (self.samples_output as i64 * 1_000_000) / self.sample_rate as i64
    }

    /// Moves the front input into the lookahead slot. An EOS input keeps its
    /// place in the queue with its payload stripped, so the EOS is handled
    /// after the frame it carried.
    fn prime(&mut self, ports: &mut Ports, host: &mut dyn ComponentHost) -> Step {
        let Some(input) = ports.input.front_mut() else {
            return Step::Stop;
        };
        let payload = input.payload();

        if !self.format_checked {
            self.format_checked = true;
            if let (Some(sample_rate), Some(channels)) =
                (header::sample_rate(payload), header::channels(payload))
            {
                if sample_rate != self.sample_rate || channels != self.channels {
                    log::info!(
                        "Stream is {} Hz, {} channels, renegotiating output",
                        sample_rate,
                        channels
                    );
                    self.sample_rate = sample_rate;
                    self.channels = channels;
                    self.trim_bytes_remaining = delay_bytes(channels);
                    host.notify(ComponentEvent::PortSettingsChanged {
                        port: PortIndex::Output,
                        config: None,
                    });
                    self.port_settings.begin();
                    return Step::Stop;
                }
            }
        }

        let data = if payload.len() > MAX_FRAME_LEN {
            log::warn!(
                "Frame of {} bytes exceeds {}, decoding it as empty",
                payload.len(),
                MAX_FRAME_LEN
            );
            Vec::new()
        } else {
            payload.to_vec()
        };
        self.lookahead = Some(PendingFrame {
            data,
            timestamp: input.timestamp,
            starts_buffer: input.offset == 0,
        });

        if input.is_eos() {
            log::debug!("Input EOS seen with a final frame");
            input.filled_len = 0;
            self.eos_status = EosStatus::InputEosSeen;
        } else if let Some(input) = ports.input.pop_front() {
            host.empty_buffer_done(input);
        }
        Step::Continue
    }

    /// Decodes `frame` into the front output buffer.
    fn decode_pending(
        &mut self,
        frame: PendingFrame,
        next_begin: u32,
        ports: &mut Ports,
        host: &mut dyn ComponentHost,
    ) -> Result<(), CodecError> {
        if frame.starts_buffer {
            self.anchor_time_us = frame.timestamp;
            self.samples_output = 0;
        }

        let input = Mp3FrameInput {
            frame: &frame.data,
            next_begin,
            bitrate_kbps: header::frame_bitrate(&frame.data),
        };
        let samples = match self
            .engine
            .decode_frame(&input, &mut self.left, &mut self.right)
        {
            Ok(samples) => samples.min(MP3_DEC_FRAME_LEN),
            Err(e) => {
                let error =
                    CodecError::DecodeFailure(format!("frame {}: {}", self.frames_decoded, e));
                log::warn!("{}, substituting silence", error);
                self.left.fill(0);
                self.right.fill(0);
                MP3_DEC_FRAME_LEN
            }
        };
        self.frames_decoded += 1;

        let channels = self.channels as usize;
        let bytes = samples * channels * BYTES_PER_SAMPLE;
        let timestamp = self.current_time_us();
        let output = ports
            .output
            .front_mut()
            .ok_or_else(|| CodecError::ProtocolViolation("No output buffer queued".to_string()))?;
        if output.capacity() < bytes {
            return Err(CodecError::ProtocolViolation(format!(
                "Output buffer holds {} bytes, a frame needs {}",
                output.capacity(),
                bytes
            )));
        }

        let pcm = output.data[..bytes].chunks_exact_mut(channels * BYTES_PER_SAMPLE);
        for (i, sample) in pcm.enumerate() {
            sample[..2].copy_from_slice(&self.left[i].to_ne_bytes());
            if channels == 2 {
                sample[2..4].copy_from_slice(&self.right[i].to_ne_bytes());
            }
        }

        let trimmed = self.trim_bytes_remaining.min(bytes);
        self.trim_bytes_remaining -= trimmed;
        output.offset = trimmed;
        output.filled_len = bytes - trimmed;
        output.timestamp = timestamp;
        output.flags = BufferFlags::empty();
        self.samples_output += samples as u64;

        if output.filled_len == 0 {
            log::debug!("Frame fully trimmed, keeping the output buffer");
            return Ok(());
        }
        if let Some(output) = ports.output.pop_front() {
            host.fill_buffer_done(output);
        }
        Ok(())
    }

    /// Consumes the EOS input and sends the EOS output.
    fn finish_stream(&mut self, ports: &mut Ports, host: &mut dyn ComponentHost) {
        if let Some(input) = ports.input.pop_front() {
            host.empty_buffer_done(input);
        }
        let timestamp = self.current_time_us();
        if let Some(mut output) = ports.output.pop_front() {
            let padding = if self.pad_end_of_stream {
                delay_bytes(self.channels).min(output.capacity())
            } else {
                0
            };
            output.data[..padding].fill(0);
            output.offset = 0;
            output.filled_len = padding;
            output.timestamp = timestamp;
            output.flags = BufferFlags::EOS;
            host.fill_buffer_done(output);
        }
        self.eos_status = EosStatus::OutputFramesFlushed;
        log::info!("Output EOS sent after {} frames", self.frames_decoded);
    }

    fn step(
        &mut self,
        ports: &mut Ports,
        host: &mut dyn ComponentHost,
    ) -> Result<Step, CodecError> {
        let Some(front) = ports.input.front() else {
            return Ok(Step::Stop);
        };
        let end_of_stream = front.is_eos();

        if front.filled_len == 0 {
            if !end_of_stream {
                if let Some(input) = ports.input.pop_front() {
                    host.empty_buffer_done(input);
                }
                return Ok(Step::Continue);
            }
            self.eos_status = EosStatus::InputEosSeen;
            return match self.lookahead.take() {
                // Nothing follows the last frame.
                Some(frame) => self.decode_pending(frame, 0, ports, host).map(|_| Step::Continue),
                None => {
                    self.finish_stream(ports, host);
                    Ok(Step::Stop)
                }
            };
        }

        if let Some(frame) = self.lookahead.take() {
            let next_begin = header::next_main_data_begin(front.payload());
            self.decode_pending(frame, next_begin, ports, host)?;
        }
        Ok(self.prime(ports, host))
    }
}

impl<E: Mp3Engine> Codec for Mp3Decoder<E> {
    fn on_queue_filled(&mut self, ports: &mut Ports, host: &mut dyn ComponentHost) {
        if self.signalled_error || self.port_settings.is_pending() {
            return;
        }

        while !ports.input.is_empty() && !ports.output.is_empty() {
            if self.eos_status == EosStatus::OutputFramesFlushed {
                return;
            }
            match self.step(ports, host) {
                Ok(Step::Continue) => {}
                Ok(Step::Stop) => return,
                Err(e) => {
                    self.signal_error(e, host);
                    return;
                }
            }
        }
    }

    fn on_port_flush_completed(&mut self, port: PortIndex, _host: &mut dyn ComponentHost) {
        if port != PortIndex::Input {
            return;
        }
        // The next output must not depend on data from before the flush.
        self.lookahead = None;
        self.left.fill(0);
        self.right.fill(0);
        if let Err(e) = self.engine.init() {
            log::warn!("MP3 engine re-init after flush failed: {}", e);
        }
        self.trim_bytes_remaining = delay_bytes(self.channels);
        self.eos_status = EosStatus::InputDataAvailable;
        log::debug!("MP3 decoder reset by input flush");
    }

    fn on_port_enable_completed(
        &mut self,
        port: PortIndex,
        enabled: bool,
        host: &mut dyn ComponentHost,
    ) {
        if port != PortIndex::Output {
            return;
        }
        if let Err(e) = self.port_settings.on_enable_completed(enabled) {
            self.signal_error(e, host);
        }
    }
}

impl<E: Mp3Engine> Drop for Mp3Decoder<E> {
    fn drop(&mut self) {
        if self.lookahead.is_some() {
            log::debug!("MP3 decoder dropped with a frame still pending");
        }
    }
}

fn delay_bytes(channels: u32) -> usize {
    DECODER_DELAY * channels as usize * BYTES_PER_SAMPLE
}

fn validate_pcm(channels: u32, sample_rate: u32) -> Result<(), CodecError> {
    if !(1..=2).contains(&channels) {
        return Err(CodecError::InvalidParameter(format!(
            "{} channels, only mono and stereo are supported",
            channels
        )));
    }
    if sample_rate == 0 {
        return Err(CodecError::InvalidParameter(
            "Sample rate must be positive".to_string(),
        ));
    }
    Ok(())
}
