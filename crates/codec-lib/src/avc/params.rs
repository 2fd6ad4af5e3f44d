use codec_types::{
    AvcEngine, CodecError, CropRect, Geometry, PortDefinition, PortFormat, PortIndex,
};

use super::decoder::AvcDecoder;
use super::types::{self, AvcLevel, AvcProfile, ProfileLevel};

const ROLE: &str = "video_decoder.avc";

impl<E: AvcEngine> AvcDecoder<E> {
    pub fn port_definition(&self, port: PortIndex) -> PortDefinition {
        match port {
            PortIndex::Input => self.input_port,
            PortIndex::Output => self.output_port,
        }
    }

    /// Applies a host-supplied port definition. Buffer sizes and counts may
    /// only grow. An output definition also sets the picture size, with the
    /// buffer size rounded up to whole macroblocks.
    pub fn set_port_definition(&mut self, definition: &PortDefinition) -> Result<(), CodecError> {
        let current = self.port_definition(definition.port);
        if definition.buffer_size < current.buffer_size {
            return Err(CodecError::InvalidParameter(format!(
                "Buffer size {} is below the {} byte minimum",
                definition.buffer_size, current.buffer_size
            )));
        }
        if definition.buffer_count_actual < current.buffer_count_min {
            return Err(CodecError::InvalidParameter(format!(
                "{} buffers requested, at least {} needed",
                definition.buffer_count_actual, current.buffer_count_min
            )));
        }

        match (definition.port, definition.format) {
            (PortIndex::Input, PortFormat::Avc) => {
                self.input_port.buffer_size = definition.buffer_size;
                self.input_port.buffer_count_actual = definition.buffer_count_actual;
            }
            (
                PortIndex::Output,
                PortFormat::RawVideo {
                    width,
                    height,
                    color_format,
                    ..
                },
            ) => {
                self.geometry = Geometry::new(width, height);
                let mut output = types::output_port_definition(width, height, color_format);
                output.buffer_count_actual = definition.buffer_count_actual;
                output.buffer_size = aligned_picture_size(width, height);
                self.output_port = output;
            }
            (port, format) => {
                return Err(CodecError::InvalidParameter(format!(
                    "{:?} is not a valid {} port format",
                    format, port
                )))
            }
        }
        Ok(())
    }

    /// Refreshes the output port after the engine reported a new picture size.
    pub(super) fn update_port_definitions(&mut self) {
        let count = self.output_port.buffer_count_actual;
        self.output_port = types::output_port_definition(
            self.geometry.width,
            self.geometry.height,
            types::color_format(self.use_native_buffers),
        );
        self.output_port.buffer_count_actual = count;
    }

    pub fn output_crop(&self) -> CropRect {
        self.geometry.crop
    }

    pub fn supported_profile_levels(&self) -> Vec<ProfileLevel> {
        [AvcProfile::Baseline, AvcProfile::Main, AvcProfile::High]
            .into_iter()
            .flat_map(|profile| {
                AvcLevel::ALL
                    .into_iter()
                    .map(move |level| ProfileLevel { profile, level })
            })
            .collect()
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

    /// Switches the output port between plain buffers and native graphics buffers.
    pub fn set_native_buffers(&mut self, enable: bool) {
        log::info!("Native output buffers {}", if enable { "on" } else { "off" });
        self.use_native_buffers = enable;
        if let PortFormat::RawVideo { color_format, .. } = &mut self.output_port.format {
            *color_format = types::color_format(enable);
        }
    }

    pub fn native_buffers(&self) -> bool {
        self.use_native_buffers
    }
}

fn aligned_picture_size(width: u32, height: u32) -> usize {
    let width = (width as usize + 15) & !15;
    let height = (height as usize + 15) & !15;
    width * height * 3 / 2
}
