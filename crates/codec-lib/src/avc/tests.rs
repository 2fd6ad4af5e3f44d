#[cfg(test)]
mod tests {
    use super::super::{AvcDecoder, AvcDecoderOptions, AvcLevel, AvcProfile};
    use crate::component::Component;
    use crate::testing::{CountingAllocator, RecordingHost, ScriptedAvcEngine};
    use codec_types::{
        BufferFlags, BufferHeader, BufferTag, CodecError, ColorFormat, ComponentEvent,
        ConfigIndex, CropRect, PortFormat, PortIndex, SessionState,
    };
    use std::cell::Cell;
    use std::rc::Rc;

    const QVGA_PICTURE: usize = 320 * 240 * 3 / 2;

    type TestComponent = Component<AvcDecoder<ScriptedAvcEngine>, RecordingHost>;

    fn options() -> AvcDecoderOptions {
        AvcDecoderOptions {
            stream_buffer_size: 4096,
            internal_buffer_size: 8192,
            ..Default::default()
        }
    }

    fn component(engine: ScriptedAvcEngine) -> (TestComponent, Rc<Cell<usize>>) {
        let allocator = CountingAllocator::default();
        let live = allocator.live.clone();
        let decoder = AvcDecoder::new(engine, Box::new(allocator), options())
            .expect("Failed to create decoder");
        (Component::new(decoder, RecordingHost::default()), live)
    }

    fn access_unit(index: u64, timestamp: i64) -> BufferHeader {
        BufferHeader::with_payload(
            BufferTag::new(index),
            &[0, 0, 0, 1, 0x65, index as u8],
            timestamp,
            BufferFlags::empty(),
        )
    }

    fn end_of_stream(index: u64) -> BufferHeader {
        BufferHeader::with_payload(BufferTag::new(index), &[], 0, BufferFlags::EOS)
    }

    fn output(index: u64) -> BufferHeader {
        BufferHeader::output(BufferTag::new(100 + index), QVGA_PICTURE)
    }

    fn queue_outputs(component: &mut TestComponent, count: u64) {
        for i in 0..count {
            component.fill_this_buffer(output(i)).expect("Output port disabled");
        }
    }

    #[test]
    fn test_reordered_pictures_keep_their_timestamps() {
        let engine = ScriptedAvcEngine {
            reorder_depth: 2,
            display_order: vec![0, 2, 1, 4, 3],
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 6);

        for i in 0..5 {
            component
                .empty_this_buffer(access_unit(i, 1000 * (i as i64 + 1)))
                .unwrap();
        }
        component.empty_this_buffer(end_of_stream(5)).unwrap();

        let host = component.host();
        assert_eq!(host.filled_timestamps(), vec![1000, 3000, 2000, 5000, 4000, 0]);
        for picture in &host.filled[..5] {
            assert_eq!(picture.filled_len, QVGA_PICTURE);
            assert!(!picture.is_eos());
        }
        let last = host.filled.last().unwrap();
        assert!(last.is_eos());
        assert_eq!(last.filled_len, 0);
        assert_eq!(host.emptied.len(), 6);
        assert!(host.errors().is_empty());

        let decoder = component.codec();
        assert_eq!(decoder.pending_pictures(), 0);
        assert_eq!(decoder.session_state(), SessionState::EosFlushed);
    }

    #[test]
    fn test_no_free_output_buffer_defers_decoding() {
        let engine = ScriptedAvcEngine {
            reorder_depth: 10,
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 2);

        for i in 0..3 {
            component.empty_this_buffer(access_unit(i, i as i64)).unwrap();
        }
        assert_eq!(component.codec().engine().decode_calls(), 2);
        assert_eq!(component.codec().pending_pictures(), 2);
        assert_eq!(component.ports().input.len(), 1);

        // More input changes nothing while every output is held.
        component.empty_this_buffer(access_unit(3, 3)).unwrap();
        assert_eq!(component.codec().engine().decode_calls(), 2);
        assert_eq!(component.codec().pending_pictures(), 2);
        assert_eq!(component.host().emptied.len(), 2);

        component.fill_this_buffer(output(2)).unwrap();
        assert_eq!(component.codec().engine().decode_calls(), 3);
        assert_eq!(component.ports().input.len(), 1);
        assert!(component.host().errors().is_empty());
    }

    #[test]
    fn test_size_change_runs_port_reconfiguration() {
        let engine = ScriptedAvcEngine {
            geometry_changes: vec![(1, 640, 480)],
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 2);

        component.empty_this_buffer(access_unit(0, 10)).unwrap();
        component.empty_this_buffer(access_unit(1, 20)).unwrap();

        assert_eq!(component.host().filled_timestamps(), vec![10]);
        assert_eq!(component.host().emptied.len(), 2);
        assert!(component.host().events.contains(&ComponentEvent::PortSettingsChanged {
            port: PortIndex::Output,
            config: None,
        }));
        assert_eq!(
            component.codec().session_state(),
            SessionState::AwaitingPortDisable
        );

        component.empty_this_buffer(access_unit(2, 30)).unwrap();
        assert_eq!(component.codec().engine().decode_calls(), 2);

        component.disable_port(PortIndex::Output);
        assert_eq!(
            component.codec().session_state(),
            SessionState::AwaitingPortEnable
        );
        let returned = component.host().filled.last().unwrap();
        assert_eq!(returned.tag, BufferTag::new(101));
        assert_eq!(returned.filled_len, 0);
        assert_eq!(component.codec().pending_pictures(), 0);

        let definition = component.codec().port_definition(PortIndex::Output);
        assert_eq!(definition.buffer_size, 640 * 480 * 3 / 2);

        component.enable_port(PortIndex::Output);
        component
            .fill_this_buffer(BufferHeader::output(BufferTag::new(200), definition.buffer_size))
            .unwrap();

        let host = component.host();
        let picture = host.filled.last().unwrap();
        assert_eq!(picture.tag, BufferTag::new(200));
        assert_eq!(picture.timestamp, 30);
        assert_eq!(picture.filled_len, 640 * 480 * 3 / 2);
        assert!(host.errors().is_empty());
        assert_eq!(component.codec().session_state(), SessionState::Decoding);
        assert_eq!(component.codec().pending_pictures(), 0);
    }

    #[test]
    fn test_failed_decode_skips_the_input() {
        let engine = ScriptedAvcEngine {
            fail_decodes: vec![1],
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 3);

        for i in 0..3 {
            component
                .empty_this_buffer(access_unit(i, 1000 * (i as i64 + 1)))
                .unwrap();
        }

        let host = component.host();
        assert_eq!(host.filled_timestamps(), vec![1000, 3000]);
        assert_eq!(host.emptied.len(), 3);
        assert!(host.errors().is_empty());
        assert_eq!(component.codec().pending_pictures(), 0);
        assert_eq!(component.codec().session_state(), SessionState::Decoding);
    }

    #[test]
    fn test_output_without_control_block_is_fatal() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        component
            .fill_this_buffer(BufferHeader::new(BufferTag::new(100), QVGA_PICTURE))
            .unwrap();
        component.empty_this_buffer(access_unit(0, 0)).unwrap();

        assert!(matches!(
            component.host().errors().as_slice(),
            [CodecError::ProtocolViolation(_)]
        ));
        assert_eq!(component.codec().session_state(), SessionState::Error);

        component.fill_this_buffer(output(1)).unwrap();
        component.empty_this_buffer(access_unit(1, 1)).unwrap();
        assert_eq!(component.codec().engine().decode_calls(), 0);
        assert_eq!(component.host().errors().len(), 1);
    }

    #[test]
    fn test_output_smaller_than_a_picture_is_fatal() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        component
            .fill_this_buffer(BufferHeader::output(BufferTag::new(100), 16))
            .unwrap();
        component.empty_this_buffer(access_unit(0, 0)).unwrap();

        let host = component.host();
        assert!(matches!(
            host.errors().as_slice(),
            [CodecError::ProtocolViolation(_)]
        ));
        assert!(host.filled.is_empty());
        assert_eq!(component.codec().engine().decode_calls(), 0);
        assert!(component.codec().engine().targets.is_empty());
        assert_eq!(component.codec().pending_pictures(), 0);
    }

    #[test]
    fn test_display_hold_is_dropped_when_the_output_port_is_disabled() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        queue_outputs(&mut component, 2);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();

        let first = BufferTag::new(100);
        assert_eq!(component.codec().refcount(first), 1);
        let mut displayed = component.host_mut().take_filled();
        assert_eq!(displayed.len(), 1);
        let mut buffer = displayed.remove(0);

        component.disable_port(PortIndex::Output);
        component.enable_port(PortIndex::Output);
        let ctrl = buffer.output_private.clone().unwrap();
        assert_eq!(ctrl.ref_count(), 0);

        buffer.filled_len = 0;
        component.fill_this_buffer(buffer).unwrap();
        component.empty_this_buffer(access_unit(1, 1)).unwrap();

        assert_eq!(component.codec().engine().decode_calls(), 2);
        assert_eq!(component.codec().engine().targets, vec![first, first]);
        let host = component.host();
        assert_eq!(host.filled.last().unwrap().tag, first);
        assert_eq!(host.filled.last().unwrap().timestamp, 1);
        assert!(host.errors().is_empty());
    }

    #[test]
    fn test_unbind_of_unknown_buffer_is_fatal() {
        let engine = ScriptedAvcEngine {
            bogus_unbind: true,
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 2);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();
        component.empty_this_buffer(access_unit(1, 1)).unwrap();

        assert!(component.codec().signalled_error());
        assert_eq!(component.codec().engine().decode_calls(), 1);
        assert!(component.host().filled.is_empty());
    }

    #[test]
    fn test_eos_with_payload_is_decoded_then_drained() {
        let engine = ScriptedAvcEngine {
            reorder_depth: 1,
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 3);

        component.empty_this_buffer(access_unit(0, 1000)).unwrap();
        let mut last = access_unit(1, 2000);
        last.flags = BufferFlags::EOS | BufferFlags::SYNC_FRAME;
        component.empty_this_buffer(last).unwrap();

        let host = component.host();
        assert_eq!(host.filled_timestamps(), vec![1000, 2000, 0]);
        assert_eq!(host.filled[1].flags, BufferFlags::SYNC_FRAME);
        assert_eq!(host.filled[1].filled_len, QVGA_PICTURE);
        assert!(host.filled[2].is_eos());
        assert_eq!(host.filled[2].filled_len, 0);
        assert_eq!(component.codec().engine().decode_calls(), 2);
        assert_eq!(component.codec().pending_pictures(), 0);
    }

    #[test]
    fn test_every_leftover_output_is_returned_at_eos() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        queue_outputs(&mut component, 3);
        component.empty_this_buffer(access_unit(0, 5)).unwrap();
        component.empty_this_buffer(end_of_stream(1)).unwrap();

        let host = component.host();
        assert_eq!(host.filled.len(), 3);
        assert!(host.filled[1..].iter().all(|b| b.is_eos() && b.filled_len == 0));
        assert!(component.ports().output.is_empty());

        // Nothing more happens once the EOS went out.
        component.fill_this_buffer(output(0)).unwrap();
        assert_eq!(component.host().filled.len(), 3);
    }

    #[test]
    fn test_extra_memory_lives_until_teardown() {
        let engine = ScriptedAvcEngine {
            extra_memory: Some((3, 1024)),
            ..Default::default()
        };
        let (mut component, live) = component(engine);
        assert_eq!(live.get(), 2);
        assert_eq!(
            component.codec().session_state(),
            SessionState::HeadersNotDecoded
        );

        queue_outputs(&mut component, 1);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();
        assert_eq!(live.get(), 5);
        assert_eq!(component.codec().extra_buffer_count(), 3);
        assert_eq!(component.codec().engine().extra_addresses.len(), 3);
        assert_eq!(component.codec().session_state(), SessionState::Decoding);

        drop(component);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn test_oversized_extra_memory_request_fails_the_decode() {
        let engine = ScriptedAvcEngine {
            extra_memory: Some((18, 1024)),
            ..Default::default()
        };
        let (mut component, live) = component(engine);
        queue_outputs(&mut component, 1);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();

        assert_eq!(live.get(), 2);
        assert!(component.host().filled.is_empty());
        assert_eq!(component.host().emptied.len(), 1);
        assert_eq!(component.codec().pending_pictures(), 0);
        assert!(!component.codec().signalled_error());
    }

    #[test]
    fn test_init_failure_frees_everything() {
        let allocator = CountingAllocator::default();
        let live = allocator.live.clone();
        let engine = ScriptedAvcEngine {
            fail_init: true,
            ..Default::default()
        };
        let result = AvcDecoder::new(engine, Box::new(allocator), options());
        assert!(matches!(result, Err(CodecError::FatalConstruction(_))));
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn test_displayed_buffer_carries_a_hold_until_requeued() {
        let engine = ScriptedAvcEngine {
            hold_references: 1,
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 2);

        component.empty_this_buffer(access_unit(0, 0)).unwrap();
        let first = BufferTag::new(100);
        assert_eq!(component.codec().refcount(first), 2);

        let returned = component.host_mut().take_filled();
        for buffer in returned {
            component.fill_this_buffer(buffer).unwrap();
        }
        assert_eq!(component.codec().refcount(first), 1);

        component.empty_this_buffer(access_unit(1, 1)).unwrap();
        assert_eq!(component.codec().refcount(first), 0);
        assert_eq!(component.codec().refcount(BufferTag::new(101)), 2);
        assert_eq!(component.codec().engine().targets, vec![first, BufferTag::new(101)]);
    }

    #[test]
    fn test_output_flush_releases_engine_references() {
        let engine = ScriptedAvcEngine {
            reorder_depth: 1,
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 2);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();
        assert_eq!(component.codec().refcount(BufferTag::new(100)), 1);
        assert_eq!(component.codec().pending_pictures(), 1);

        component.flush(PortIndex::Input);
        component.flush(PortIndex::Output);

        assert_eq!(component.codec().engine().release_reference_calls, 1);
        assert_eq!(component.codec().refcount(BufferTag::new(100)), 0);
        assert_eq!(component.codec().pending_pictures(), 0);
        assert_eq!(component.host().filled.len(), 2);
        assert!(component.host().filled.iter().all(|b| b.filled_len == 0));
    }

    #[test]
    fn test_flush_after_eos_resumes_decoding() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        queue_outputs(&mut component, 2);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();
        component.empty_this_buffer(end_of_stream(1)).unwrap();
        assert_eq!(component.codec().session_state(), SessionState::EosFlushed);

        component.flush(PortIndex::Input);
        component.flush(PortIndex::Output);
        assert_eq!(component.codec().session_state(), SessionState::Decoding);

        let returned = component.host_mut().take_filled();
        for buffer in returned {
            component.fill_this_buffer(buffer).unwrap();
        }
        component.empty_this_buffer(access_unit(2, 42)).unwrap();
        assert_eq!(component.host().filled_timestamps(), vec![42]);
    }

    #[test]
    fn test_crop_change_is_announced_without_stopping() {
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 316,
            height: 236,
        };
        let engine = ScriptedAvcEngine {
            crop: Some(crop),
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 2);
        component.empty_this_buffer(access_unit(0, 0)).unwrap();
        component.empty_this_buffer(access_unit(1, 1)).unwrap();

        let crop_events = component
            .host()
            .events
            .iter()
            .filter(|event| {
                **event
                    == ComponentEvent::PortSettingsChanged {
                        port: PortIndex::Output,
                        config: Some(ConfigIndex::OutputCrop),
                    }
            })
            .count();
        assert_eq!(crop_events, 1);
        assert_eq!(component.codec().output_crop(), crop);
        assert_eq!(component.host().filled.len(), 2);
    }

    #[test]
    fn test_codec_config_leaves_no_pending_picture() {
        let engine = ScriptedAvcEngine {
            no_picture: vec![0],
            ..Default::default()
        };
        let (mut component, _) = component(engine);
        queue_outputs(&mut component, 1);
        let mut config = access_unit(0, 0);
        config.flags = BufferFlags::CODEC_CONFIG;
        component.empty_this_buffer(config).unwrap();

        assert!(component.host().filled.is_empty());
        assert_eq!(component.host().emptied, vec![BufferTag::new(0)]);
        assert_eq!(component.codec().pending_pictures(), 0);
    }

    #[test]
    fn test_oversized_access_unit_is_dropped() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        queue_outputs(&mut component, 1);
        let unit =
            BufferHeader::with_payload(BufferTag::new(0), &[0u8; 5000], 0, BufferFlags::empty());
        component.empty_this_buffer(unit).unwrap();

        assert_eq!(component.codec().engine().decode_calls(), 0);
        assert_eq!(component.host().emptied.len(), 1);
        assert_eq!(component.codec().pending_pictures(), 0);
    }

    #[test]
    fn test_port_parameters() {
        let (mut component, _) = component(ScriptedAvcEngine::default());
        let decoder = component.codec_mut();

        let input = decoder.port_definition(PortIndex::Input);
        assert_eq!(input.format, PortFormat::Avc);
        assert_eq!(input.buffer_size, 8192);

        let mut output = decoder.port_definition(PortIndex::Output);
        assert_eq!(output.buffer_size, QVGA_PICTURE);
        output.format = PortFormat::RawVideo {
            width: 1920,
            height: 1080,
            stride: 1920,
            slice_height: 1080,
            color_format: ColorFormat::Yuv420Planar,
        };
        output.buffer_count_actual = 4;
        decoder.set_port_definition(&output).unwrap();
        let output = decoder.port_definition(PortIndex::Output);
        assert_eq!(output.buffer_size, 1920 * 1088 * 3 / 2);
        assert_eq!(output.buffer_count_actual, 4);
        assert_eq!(decoder.geometry().width, 1920);
        assert_eq!(decoder.output_crop().height, 1080);

        let mut shrunk = output;
        shrunk.buffer_size = 16;
        assert!(matches!(
            decoder.set_port_definition(&shrunk),
            Err(CodecError::InvalidParameter(_))
        ));
        let mut wrong = input;
        wrong.format = PortFormat::Mp3;
        assert!(decoder.set_port_definition(&wrong).is_err());

        assert!(decoder.set_role("video_decoder.avc").is_ok());
        assert!(decoder.set_role("audio_decoder.mp3").is_err());

        let levels = decoder.supported_profile_levels();
        assert_eq!(levels.len(), 48);
        assert_eq!(levels[0].profile, AvcProfile::Baseline);
        assert_eq!(levels[0].level, AvcLevel::L1);
        assert_eq!(levels[47].profile, AvcProfile::High);
        assert_eq!(levels[47].level, AvcLevel::L51);

        decoder.set_native_buffers(true);
        assert!(decoder.native_buffers());
        assert!(matches!(
            decoder.port_definition(PortIndex::Output).format,
            PortFormat::RawVideo {
                color_format: ColorFormat::Yuv420SemiPlanar,
                ..
            }
        ));
    }
}
