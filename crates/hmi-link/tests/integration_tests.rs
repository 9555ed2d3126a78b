//! Integration tests for the HMI link engine
//!
//! These tests drive [`HmiLink`] against a simulated display running on the
//! other end of an in-memory duplex stream, covering:
//! - The convenience command API and device rejections
//! - Reset, where silence is success and the startup event follows
//! - EEPROM and waveform transfers in transparent data mode
//! - Touch and sleep events arriving with and without a command in flight

use hmi_link::{HmiLink, LinkConfig, LinkError, LinkState};
use hmi_protocol::{DeviceState, ResultCode, TouchAction, TouchEvent};
use hmi_sim::{run_virtual_display_task, VirtualDisplay, VirtualDisplayCommand, VirtualDisplayConfig};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    pub struct Bench {
        pub link: HmiLink<DuplexStream>,
        pub display: mpsc::Sender<VirtualDisplayCommand>,
        pub task: JoinHandle<std::io::Result<VirtualDisplay>>,
    }

    impl Bench {
        /// Stop the simulated display and return its final state
        pub async fn finish(self) -> VirtualDisplay {
            self.link.shutdown().await;
            self.display
                .send(VirtualDisplayCommand::Shutdown)
                .await
                .unwrap();
            self.task.await.unwrap().unwrap()
        }
    }

    pub fn link_config(background_reader: bool) -> LinkConfig {
        LinkConfig {
            read_timeout_ms: 200,
            lock_timeout_ms: 1000,
            background_reader,
            ..LinkConfig::default()
        }
    }

    /// Connect a link to a freshly spawned virtual display
    pub fn bench_with(config: LinkConfig, display: VirtualDisplayConfig) -> Bench {
        let (io, display_io) = tokio::io::duplex(4096);
        let (display_tx, display_rx) = mpsc::channel(32);
        let task = tokio::spawn(run_virtual_display_task(
            display_io,
            VirtualDisplay::from_config(display),
            display_rx,
        ));
        Bench {
            link: HmiLink::new(io, config),
            display: display_tx,
            task,
        }
    }

    pub fn bench(background_reader: bool) -> Bench {
        bench_with(
            link_config(background_reader),
            VirtualDisplayConfig::default(),
        )
    }

    /// Wait until `check` passes, processing events by hand in inline mode
    pub async fn wait_for(link: &HmiLink<DuplexStream>, mut check: impl FnMut() -> bool) {
        for _ in 0..50 {
            if !link.config().background_reader {
                link.process_pending_events().await.unwrap();
            }
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }
}

// ============================================================================
// Command API Tests
// ============================================================================

mod command_tests {
    use super::*;

    #[tokio::test]
    async fn text_round_trip_with_escapes() {
        for background in [false, true] {
            let bench = helpers::bench(background);

            bench.link.set_text("t0", "a \"quoted\" \\ path").await.unwrap();
            let text = bench.link.get_text("t0", 64).await.unwrap();
            assert_eq!(text, "a \"quoted\" \\ path");

            let display = bench.finish().await;
            assert_eq!(display.text("t0"), Some("a \"quoted\" \\ path"));
        }
    }

    #[tokio::test]
    async fn text_longer_than_capacity_is_an_error() {
        let bench = helpers::bench(true);
        let result = bench.link.get_text("t0", 3).await;
        assert!(matches!(result, Err(LinkError::Protocol(_))));

        // The link is usable afterwards
        assert_eq!(bench.link.get_value("n0").await.unwrap(), 50);
        bench.finish().await;
    }

    #[tokio::test]
    async fn values_and_attributes() {
        let bench = helpers::bench(true);

        bench.link.set_value("n0", -12).await.unwrap();
        assert_eq!(bench.link.get_value("n0").await.unwrap(), -12);

        bench.link.set_attribute("main.n0", "pco", 2016).await.unwrap();
        assert_eq!(bench.link.get_attribute("n0", "pco").await.unwrap(), 2016);

        bench.finish().await;
    }

    #[tokio::test]
    async fn device_rejections_carry_the_code() {
        let bench = helpers::bench(false);

        let err = bench.link.get_value("n9").await.unwrap_err();
        assert_eq!(err.device_code(), Some(ResultCode::InvalidVariable));

        let err = bench.link.refresh("missing").await.unwrap_err();
        assert_eq!(err.device_code(), Some(ResultCode::InvalidComponent));

        let err = bench.link.show_page(9u8).await.unwrap_err();
        assert_eq!(err.device_code(), Some(ResultCode::InvalidPage));

        bench.finish().await;
    }

    #[tokio::test]
    async fn pages_and_display_settings() {
        let bench = helpers::bench(true);

        bench.link.show_page("settings").await.unwrap();
        assert_eq!(bench.link.current_page().await.unwrap(), 1);
        bench.link.set_visible("h0", false).await.unwrap();
        bench.link.click("b1", true).await.unwrap();
        bench.link.set_brightness(40).await.unwrap();
        bench.link.set_touch_wake(true).await.unwrap();
        bench.link.set_auto_sleep(30).await.unwrap();

        let display = bench.finish().await;
        assert_eq!(display.current_page(), 1);
        assert_eq!(display.is_visible("h0"), Some(false));
        assert_eq!(display.brightness(), 40);
        assert_eq!(display.auto_sleep_secs(), 30);
        assert!(display
            .received_commands()
            .iter()
            .any(|c| c == "click b1,1"));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_wire() {
        let bench = helpers::bench(true);

        assert!(matches!(
            bench.link.set_brightness(101).await,
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(matches!(
            bench.link.set_auto_sleep(2).await,
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(matches!(
            bench.link.set_text("t0", "caf\u{e9}").await,
            Err(LinkError::InvalidArgument(_))
        ));

        let display = bench.finish().await;
        assert!(display.received_commands().is_empty());
    }

    #[tokio::test]
    async fn reset_succeeds_on_silence_and_announces_startup() {
        for background in [false, true] {
            let bench = helpers::bench_with(
                helpers::link_config(background),
                VirtualDisplayConfig {
                    reset_delay_ms: 300,
                    ..Default::default()
                },
            );
            let states = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
            let seen = states.clone();
            bench
                .link
                .on_device_state(move |state| seen.lock().unwrap().push(state));

            bench.link.set_value("n0", 1).await.unwrap();
            bench.link.reset().await.unwrap();

            helpers::wait_for(&bench.link, || states.lock().unwrap().len() >= 2).await;
            assert_eq!(
                *states.lock().unwrap(),
                vec![DeviceState::Startup, DeviceState::Ready]
            );

            // Power-on state restored
            assert_eq!(bench.link.get_value("n0").await.unwrap(), 50);
            bench.finish().await;
        }
    }
}

// ============================================================================
// Transparent Data Tests
// ============================================================================

mod transparent_tests {
    use super::*;

    #[tokio::test]
    async fn eeprom_write_then_read() {
        for background in [false, true] {
            let bench = helpers::bench(background);
            let data = [0x12, 0xFF, 0xFF, 0xFF, 0x00, 0x34];

            bench.link.eeprom_write(100, &data).await.unwrap();
            assert_eq!(bench.link.state(), LinkState::Idle);
            assert_eq!(bench.link.eeprom_read(100, 6).await.unwrap(), data.to_vec());

            let display = bench.finish().await;
            assert_eq!(&display.eeprom()[100..106], &data);
        }
    }

    #[tokio::test]
    async fn eeprom_out_of_range_rejected_locally() {
        let bench = helpers::bench(true);
        assert!(matches!(
            bench.link.eeprom_read(1020, 8).await,
            Err(LinkError::InvalidArgument(_))
        ));
        assert!(matches!(
            bench.link.eeprom_write(1023, &[1, 2]).await,
            Err(LinkError::InvalidArgument(_))
        ));
        bench.finish().await;
    }

    #[tokio::test]
    async fn waveform_stream_and_samples() {
        let bench = helpers::bench(true);

        bench.link.waveform_add(1, 0, 10).await.unwrap();
        bench.link.waveform_stream(1, 0, &[20, 30, 40]).await.unwrap();
        bench.link.waveform_add(1, 1, 99).await.unwrap();
        bench
            .link
            .waveform_clear(1, hmi_protocol::command::ALL_CHANNELS)
            .await
            .unwrap();
        bench.link.waveform_stream(2, 3, &[1, 2]).await.unwrap();

        let display = bench.finish().await;
        assert!(display.waveform(1, 0).is_empty());
        assert!(display.waveform(1, 1).is_empty());
        assert_eq!(display.waveform(2, 3), &[1, 2]);
    }

    #[tokio::test]
    async fn manual_session_blocks_commands_until_finished() {
        let bench = helpers::bench(true);

        bench
            .link
            .begin_transparent_data(2, "wept 0,2")
            .await
            .unwrap();
        assert_eq!(bench.link.state(), LinkState::TransparentDataActive);
        assert!(matches!(
            bench.link.get_value("n0").await,
            Err(LinkError::InvalidState(_))
        ));

        bench.link.write_transparent_byte(0xAB).await.unwrap();
        bench.link.write_transparent_byte(0xCD).await.unwrap();
        bench.link.end_transparent_data().await.unwrap();
        assert_eq!(bench.link.get_value("n0").await.unwrap(), 50);

        let display = bench.finish().await;
        assert_eq!(&display.eeprom()[..2], &[0xAB, 0xCD]);
    }
}

// ============================================================================
// Event Tests
// ============================================================================

mod event_tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn touch_delivered_while_idle() {
        for background in [false, true] {
            let bench = helpers::bench(background);
            let touches = Arc::new(Mutex::new(Vec::new()));
            let seen = touches.clone();
            bench.link.on_touch(move |touch| seen.lock().unwrap().push(touch));

            bench
                .display
                .send(VirtualDisplayCommand::Touch {
                    component: "t0".to_string(),
                    action: TouchAction::Press,
                })
                .await
                .unwrap();

            helpers::wait_for(&bench.link, || !touches.lock().unwrap().is_empty()).await;
            assert_eq!(
                touches.lock().unwrap()[0],
                TouchEvent {
                    page_id: 0,
                    component_id: 1,
                    action: TouchAction::Press,
                }
            );
            bench.finish().await;
        }
    }

    #[tokio::test]
    async fn sleep_and_coordinate_events() {
        let bench = helpers::bench(true);
        let states = Arc::new(Mutex::new(Vec::new()));
        let coords = Arc::new(Mutex::new(Vec::new()));
        let seen = states.clone();
        bench
            .link
            .on_device_state(move |state| seen.lock().unwrap().push(state));
        let seen = coords.clone();
        bench
            .link
            .on_coordinate(move |coord| seen.lock().unwrap().push(coord));

        bench
            .display
            .send(VirtualDisplayCommand::SetSleeping(true))
            .await
            .unwrap();
        bench
            .display
            .send(VirtualDisplayCommand::TouchAt {
                x: 480,
                y: 272,
                action: TouchAction::Press,
            })
            .await
            .unwrap();

        helpers::wait_for(&bench.link, || !coords.lock().unwrap().is_empty()).await;
        assert_eq!(*states.lock().unwrap(), vec![DeviceState::AutoSleep]);
        let coord = coords.lock().unwrap()[0];
        assert_eq!((coord.x, coord.y), (480, 272));
        assert!(coord.exited_sleep);
        bench.finish().await;
    }

    #[tokio::test]
    async fn stray_reply_is_not_an_event() {
        let bench = helpers::bench(false);
        let count = Arc::new(Mutex::new(0usize));
        let seen = count.clone();
        bench.link.on_device_state(move |_| *seen.lock().unwrap() += 1);

        bench
            .display
            .send(VirtualDisplayCommand::Emit(vec![0x01, 0xFF, 0xFF, 0xFF]))
            .await
            .unwrap();
        bench
            .display
            .send(VirtualDisplayCommand::Emit(vec![0x88, 0xFF, 0xFF, 0xFF]))
            .await
            .unwrap();

        helpers::wait_for(&bench.link, || *count.lock().unwrap() == 1).await;

        // Nothing left over to confuse the next command
        assert_eq!(bench.link.get_value("n0").await.unwrap(), 50);
        assert_eq!(*count.lock().unwrap(), 1);
        bench.finish().await;
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use hmi_protocol::{DisplayEvent, ResponseParser, TERMINATOR};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn touch_action() -> impl Strategy<Value = TouchAction> {
        prop_oneof![Just(TouchAction::Press), Just(TouchAction::Release)]
    }

    fn event() -> impl Strategy<Value = DisplayEvent> {
        prop_oneof![
            (any::<u8>(), any::<u8>(), touch_action()).prop_map(|(page_id, component_id, action)| {
                DisplayEvent::Touch(TouchEvent {
                    page_id,
                    component_id,
                    action,
                })
            }),
            prop_oneof![
                Just(DeviceState::AutoSleep),
                Just(DeviceState::AutoWake),
                Just(DeviceState::Ready),
            ]
            .prop_map(DisplayEvent::DeviceState),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn events_ahead_of_reply_are_all_delivered(
            events in prop::collection::vec(event(), 0..6),
            value in any::<i32>(),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (delivered, response) = runtime.block_on(async {
                let (io, mut peer) = tokio::io::duplex(4096);
                let link = HmiLink::new(io, helpers::link_config(false));

                let delivered = Arc::new(Mutex::new(Vec::new()));
                let seen = delivered.clone();
                link.on_touch(move |t| seen.lock().unwrap().push(DisplayEvent::Touch(t)));
                let seen = delivered.clone();
                link.on_device_state(move |s| seen.lock().unwrap().push(DisplayEvent::DeviceState(s)));

                let wire_events = events.clone();
                let device = tokio::spawn(async move {
                    let mut command = Vec::new();
                    let mut byte = [0u8; 1];
                    while !command.ends_with(&TERMINATOR) {
                        peer.read_exact(&mut byte).await.unwrap();
                        command.push(byte[0]);
                    }
                    for event in &wire_events {
                        peer.write_all(&event.encode()).await.unwrap();
                    }
                    let mut reply = vec![0x71];
                    reply.extend_from_slice(&value.to_le_bytes());
                    reply.extend_from_slice(&TERMINATOR);
                    peer.write_all(&reply).await.unwrap();
                    peer
                });

                let response = link.send("get n0.val", ResponseParser::Number).await.unwrap();
                let _peer = device.await.unwrap();
                let delivered = delivered.lock().unwrap().clone();
                (delivered, response)
            });

            prop_assert_eq!(response, hmi_protocol::Response::Number(value));
            prop_assert_eq!(delivered, events);
        }
    }
}
