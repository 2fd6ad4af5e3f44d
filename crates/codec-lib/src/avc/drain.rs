use codec_types::{AvcEngine, BufferFlags, CodecError, DecodedPicture};

use super::decoder::{AvcDecoder, FrameCallbacks};
use crate::component::{ComponentHost, EosStatus, Ports};

impl<E: AvcEngine> AvcDecoder<E> {
    /// Returns the output buffer a finished picture was decoded into, carrying
    /// the metadata of the input that produced it.
    pub(super) fn drain_one_output_buffer(
        &mut self,
        picture: DecodedPicture,
        ports: &mut Ports,
        host: &mut dyn ComponentHost,
    ) -> Result<(), CodecError> {
        let position = ports
            .output
            .iter()
            .position(|buffer| buffer.tag == picture.tag)
            .ok_or_else(|| {
                CodecError::ProtocolViolation(format!(
                    "Picture {} was decoded into {:?}, which is not queued",
                    picture.picture_id, picture.tag
                ))
            })?;
        let meta = self.pictures.take(picture.picture_id)?;
        let mut output = ports.output.remove(position).ok_or_else(|| {
            CodecError::ProtocolViolation(format!("Output buffer {} vanished", position))
        })?;

        output.timestamp = meta.timestamp;
        output.flags = meta.flags;
        output.filled_len = self.geometry.picture_size();
        self.frames.refs.hand_to_host(output.tag, true);
        log::trace!(
            "Picture {} out at {} in {:?}",
            picture.picture_id,
            output.timestamp,
            output.tag
        );
        host.fill_buffer_done(output);
        Ok(())
    }

    /// Empties the engine after input EOS. Each queued output buffer gets the
    /// next picture still held for display, or else goes back as a zero-length
    /// EOS buffer.
    pub(super) fn drain_all_output_buffers(
        &mut self,
        ports: &mut Ports,
        host: &mut dyn ComponentHost,
    ) {
        log::debug!("Draining {} output buffers", ports.output.len());
        while !ports.output.is_empty() {
            let picture = if self.frames.headers_decoded {
                let mut callbacks = FrameCallbacks::new(&mut self.frames);
                let picture = self.engine.last_displayed_frame(&mut callbacks);
                if let Err(e) = callbacks.finish() {
                    self.signal_error(e, host);
                    return;
                }
                picture
            } else {
                None
            };

            if let Some(picture) = picture {
                if let Err(e) = self.drain_one_output_buffer(picture, ports, host) {
                    self.signal_error(e, host);
                    return;
                }
                continue;
            }

            let Some(mut output) = ports.output.pop_front() else {
                break;
            };
            output.timestamp = 0;
            output.filled_len = 0;
            output.flags = BufferFlags::EOS;
            self.frames.refs.hand_to_host(output.tag, false);
            host.fill_buffer_done(output);

            if self.eos_status != EosStatus::OutputFramesFlushed {
                self.eos_status = EosStatus::OutputFramesFlushed;
                log::info!("Output EOS sent");
                let orphans = self.pictures.clear();
                if !orphans.is_empty() {
                    log::warn!(
                        "Engine never displayed {} pictures: {:?}",
                        orphans.len(),
                        orphans
                    );
                }
            }
        }
    }
}
