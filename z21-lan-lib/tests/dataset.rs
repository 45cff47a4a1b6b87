use z21_lan_lib::{
    parse_datagram, BroadcastFlags, DataSet, DecodeError, DecoderMode, FeatureSet, HwInfo, LanX,
    SystemState,
};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn parse_one(id: u16, payload: &[u8]) -> Result<DataSet, DecodeError> {
    DataSet::parse(id, payload)
}

#[test]
fn serial_number_request_and_response() -> TestResult {
    assert_eq!(
        DataSet::GetSerialNumber.pack(),
        vec![0x04, 0x00, 0x10, 0x00]
    );

    let response = parse_one(0x10, &[0x11, 0x22, 0x33, 0x44])?;
    assert_eq!(
        response,
        DataSet::SerialNumber {
            serial_number: 0x4433_2211
        }
    );
    Ok(())
}

#[test]
fn code_request_and_response() -> TestResult {
    assert_eq!(DataSet::GetCode.pack(), vec![0x04, 0x00, 0x18, 0x00]);
    assert_eq!(
        parse_one(0x18, &[0x02])?,
        DataSet::Code(FeatureSet::StartUnlocked)
    );
    assert_eq!(
        parse_one(0x18, &[0x7f])?,
        DataSet::Code(FeatureSet::Unknown),
        "unassigned codes map to Unknown"
    );
    Ok(())
}

#[test]
fn hwinfo_response_decodes_reversed_bcd_firmware() -> TestResult {
    #[rustfmt::skip]
    let payload = [
        0x00, 0x02, 0x00, 0x00,  // hw_type 0x00000200, little-endian
        0x33, 0x0a, 0x00, 0x00,  // firmware V10.33, BCD, read back-to-front
    ];
    match parse_one(0x1a, &payload)? {
        DataSet::HwInfo(info) => {
            assert_eq!(info.hw_type, 0x0000_0200);
            assert_eq!(info.fw_version(), "10.33");
        }
        other => panic!("expected HwInfo, got {other:?}"),
    }
    Ok(())
}

#[test]
fn coalesced_datagram_parses_in_order() -> TestResult {
    #[rustfmt::skip]
    let datagram = [
        0x04, 0x00, 0x10, 0x00,  // LAN_GET_SERIAL_NUMBER
        0x04, 0x00, 0x18, 0x00,  // LAN_GET_CODE
    ];
    let frames: Vec<DataSet> = parse_datagram(&datagram).collect::<Result<_, _>>()?;
    assert_eq!(frames, vec![DataSet::GetSerialNumber, DataSet::GetCode]);
    Ok(())
}

#[test]
fn framing_round_trips_arbitrary_sequences() -> TestResult {
    let sequence = vec![
        DataSet::GetSerialNumber,
        DataSet::X(LanX::SetLocoDrive {
            address: 3,
            speed: 30,
            forward: true,
        }),
        DataSet::SerialNumber {
            serial_number: 0xdead_beef,
        },
        DataSet::SetBroadcastFlags(
            BroadcastFlags::DRIVING_AND_SWITCHING | BroadcastFlags::Z21_STATUS_CHANGES,
        ),
        DataSet::Unknown {
            id: 0xf0,
            payload: vec![0x01, 0x02, 0x03],
        },
        DataSet::LocoMode {
            address: 0x1234,
            mode: DecoderMode::Mm,
        },
        DataSet::SystemStateChanged(SystemState {
            main_current: -120,
            prog_current: 0,
            filtered_main_current: -118,
            temperature: 31,
            supply_voltage: 18_400,
            vcc_voltage: 17_950,
            central_state: 0x00,
            central_state_ex: 0x00,
            capabilities: 0x3f,
        }),
        DataSet::Logoff,
    ];

    let mut wire = Vec::new();
    for dataset in &sequence {
        wire.extend_from_slice(&dataset.pack());
    }

    let reparsed: Vec<DataSet> = parse_datagram(&wire).collect::<Result<_, _>>()?;
    assert_eq!(reparsed, sequence);
    Ok(())
}

#[test]
fn outer_round_trips_every_kind() -> TestResult {
    let datasets = vec![
        DataSet::GetSerialNumber,
        DataSet::SerialNumber { serial_number: 1 },
        DataSet::GetCode,
        DataSet::Code(FeatureSet::NoLock),
        DataSet::GetHwInfo,
        DataSet::HwInfo(HwInfo {
            hw_type: 0x0000_0201,
            fw_bcd: [0x42, 0x01, 0x00, 0x00],
        }),
        DataSet::Logoff,
        DataSet::X(LanX::GetStatus),
        DataSet::SetBroadcastFlags(BroadcastFlags::RBUS_FEEDBACK_CHANGES),
        DataSet::GetBroadcastFlags,
        DataSet::BroadcastFlags(BroadcastFlags::RAILCOM_LOCO_CHANGES),
        DataSet::GetLocoMode { address: 3 },
        DataSet::LocoMode {
            address: 3,
            mode: DecoderMode::Dcc,
        },
        DataSet::SetLocoMode {
            address: 3,
            mode: DecoderMode::Mm,
        },
        DataSet::GetTurnoutMode { address: 21 },
        DataSet::TurnoutMode {
            address: 21,
            mode: DecoderMode::Dcc,
        },
        DataSet::SetTurnoutMode {
            address: 21,
            mode: DecoderMode::Mm,
        },
        DataSet::SystemStateChanged(SystemState::default()),
        DataSet::GetSystemState,
        DataSet::Unknown {
            id: 0x1234,
            payload: vec![0xaa, 0xbb],
        },
    ];
    for dataset in datasets {
        let wire = dataset.pack();
        let mut frames = parse_datagram(&wire);
        let reparsed = frames.next().expect("one frame")?;
        assert!(frames.next().is_none(), "exactly one frame for {wire:02x?}");
        assert_eq!(reparsed, dataset, "round trip failed for {wire:02x?}");
    }
    Ok(())
}

#[test]
fn locomode_addresses_are_big_endian() -> TestResult {
    // The four mode DataSets are the only big-endian address fields.
    let wire = DataSet::GetLocoMode { address: 0x1234 }.pack();
    assert_eq!(wire, vec![0x06, 0x00, 0x60, 0x00, 0x12, 0x34]);

    let wire = DataSet::SetLocoMode {
        address: 0x1234,
        mode: DecoderMode::Mm,
    }
    .pack();
    assert_eq!(wire, vec![0x07, 0x00, 0x61, 0x00, 0x12, 0x34, 0x01]);

    assert_eq!(
        parse_one(0x70, &[0x12, 0x34])?,
        DataSet::GetTurnoutMode { address: 0x1234 }
    );
    Ok(())
}

#[test]
fn broadcast_flag_bits_match_the_station_manual() {
    assert_eq!(BroadcastFlags::DRIVING_AND_SWITCHING.bits(), 0x1);
    assert_eq!(BroadcastFlags::RBUS_FEEDBACK_CHANGES.bits(), 0x2);
    assert_eq!(BroadcastFlags::RAILCOM_LOCO_CHANGES.bits(), 0x4);
    assert_eq!(BroadcastFlags::Z21_STATUS_CHANGES.bits(), 0x100);

    let wire = DataSet::SetBroadcastFlags(
        BroadcastFlags::DRIVING_AND_SWITCHING | BroadcastFlags::Z21_STATUS_CHANGES,
    )
    .pack();
    assert_eq!(wire, vec![0x08, 0x00, 0x50, 0x00, 0x01, 0x01, 0x00, 0x00]);
}

#[test]
fn systemstate_payload_layout() -> TestResult {
    #[rustfmt::skip]
    let payload = [
        0x88, 0xff,  // main current -120 mA
        0x00, 0x00,  // prog current
        0x8a, 0xff,  // filtered main current -118 mA
        0x1f, 0x00,  // temperature 31 degrees
        0xe0, 0x47,  // supply voltage 18400 mV
        0x1e, 0x46,  // vcc voltage 17950 mV
        0x25,        // central state
        0x01,        // central state ex
        0x00,        // reserved
        0x3f,        // capabilities
    ];
    match parse_one(0x84, &payload)? {
        DataSet::SystemStateChanged(state) => {
            assert_eq!(state.main_current, -120);
            assert_eq!(state.prog_current, 0);
            assert_eq!(state.filtered_main_current, -118);
            assert_eq!(state.temperature, 31);
            assert_eq!(state.supply_voltage, 18_400);
            assert_eq!(state.vcc_voltage, 17_950);
            assert_eq!(state.central_state, 0x25);
            assert_eq!(state.central_state_ex, 0x01);
            assert_eq!(state.capabilities, 0x3f);
        }
        other => panic!("expected SystemStateChanged, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_ids_consume_their_declared_size() -> TestResult {
    #[rustfmt::skip]
    let datagram = [
        0x07, 0x00, 0xf0, 0x00, 0xaa, 0xbb, 0xcc,  // unknown id 0xf0
        0x04, 0x00, 0x10, 0x00,                    // followed by a known frame
    ];
    let frames: Vec<DataSet> = parse_datagram(&datagram).collect::<Result<_, _>>()?;
    assert_eq!(
        frames,
        vec![
            DataSet::Unknown {
                id: 0xf0,
                payload: vec![0xaa, 0xbb, 0xcc],
            },
            DataSet::GetSerialNumber,
        ]
    );
    Ok(())
}

#[test]
fn malformed_frame_is_skipped_not_fatal() {
    // A LAN_X frame with a broken checksum, then a valid request.
    #[rustfmt::skip]
    let datagram = [
        0x07, 0x00, 0x40, 0x00, 0x21, 0x24, 0xff,  // checksum should be 0x05
        0x04, 0x00, 0x18, 0x00,
    ];
    let frames: Vec<Result<DataSet, DecodeError>> = parse_datagram(&datagram).collect();
    assert_eq!(frames.len(), 2);
    assert!(matches!(
        frames[0],
        Err(DecodeError::BadChecksum { .. })
    ));
    assert_eq!(frames[1], Ok(DataSet::GetCode));
}

#[test]
fn undersized_length_field_stops_the_datagram() {
    let datagram = [0x02, 0x00, 0x10, 0x00];
    let frames: Vec<Result<DataSet, DecodeError>> = parse_datagram(&datagram).collect();
    assert_eq!(frames.len(), 1);
    assert!(matches!(frames[0], Err(DecodeError::BadLength(2))));
}

#[test]
fn overlong_length_field_reports_truncation() {
    let datagram = [0x10, 0x00, 0x10, 0x00, 0x11, 0x22];
    let frames: Vec<Result<DataSet, DecodeError>> = parse_datagram(&datagram).collect();
    assert_eq!(frames.len(), 1);
    assert!(matches!(
        frames[0],
        Err(DecodeError::TruncatedDataSet {
            declared: 16,
            available: 6,
        })
    ));
}

#[test]
fn known_id_with_wrong_payload_length_is_an_error() {
    assert!(matches!(
        parse_one(0x10, &[0x11, 0x22]),
        Err(DecodeError::UnexpectedLength { .. })
    ));
    assert!(matches!(
        parse_one(0x84, &[0x00; 10]),
        Err(DecodeError::UnexpectedLength { .. })
    ));
}

#[test]
fn trailing_partial_header_is_ignored() -> TestResult {
    // Fewer than 4 trailing bytes cannot form a header; parsing stops.
    let mut datagram = DataSet::GetSerialNumber.pack();
    datagram.extend_from_slice(&[0x04, 0x00]);
    let frames: Vec<DataSet> = parse_datagram(&datagram).collect::<Result<_, _>>()?;
    assert_eq!(frames, vec![DataSet::GetSerialNumber]);
    Ok(())
}
