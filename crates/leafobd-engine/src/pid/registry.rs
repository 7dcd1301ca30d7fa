//! The Leaf PID registry
//!
//! Headers and commands follow the ZE0/AZE0 gateway layout: the battery
//! controller answers on 79B, the body/meter ECU on 743, the VCM on 797.
//! Standard mode-01 PIDs go out as functional requests on 7DF.

use super::{Decoder, PidRequest, SignalSpec};

static LBC: PidRequest = PidRequest {
    key: "lbc",
    description: "traction battery controller group 01",
    header: "79B",
    command: "022101",
    response_prefix: &[0x61, 0x01],
    expect_len: 53,
    frames_hint: Some(8),
    signals: &[
        SignalSpec {
            name: "battery_pack_current",
            unit: Some("A"),
            decoder: Decoder::Signed {
                offset: 2,
                len: 4,
                scale: 1.0 / 1024.0,
                bias: 0.0,
            },
            range: Some((-300.0, 300.0)),
        },
        SignalSpec {
            name: "battery_pack_voltage",
            unit: Some("V"),
            decoder: Decoder::Unsigned {
                offset: 20,
                len: 2,
                scale: 0.01,
                bias: 0.0,
            },
            range: Some((200.0, 450.0)),
        },
        SignalSpec {
            name: "battery_health_pct",
            unit: Some("%"),
            decoder: Decoder::Unsigned {
                offset: 30,
                len: 2,
                scale: 1.0 / 102.4,
                bias: 0.0,
            },
            range: Some((0.0, 100.0)),
        },
        SignalSpec {
            name: "state_of_charge_pct",
            unit: Some("%"),
            decoder: Decoder::Unsigned {
                offset: 33,
                len: 3,
                scale: 1.0 / 10000.0,
                bias: 0.0,
            },
            range: Some((0.0, 100.0)),
        },
        SignalSpec {
            name: "battery_capacity_ah",
            unit: Some("Ah"),
            decoder: Decoder::Unsigned {
                offset: 37,
                len: 3,
                scale: 1.0 / 10000.0,
                bias: 0.0,
            },
            range: Some((0.0, 200.0)),
        },
    ],
};

static ODOMETER: PidRequest = PidRequest {
    key: "odometer",
    description: "odometer reading",
    header: "743",
    command: "03220E01",
    response_prefix: &[0x62, 0x0E, 0x01],
    expect_len: 6,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "odometer_km",
        unit: Some("km"),
        decoder: Decoder::Unsigned {
            offset: 3,
            len: 3,
            scale: 1.0,
            bias: 0.0,
        },
        range: Some((0.0, 1_000_000.0)),
    }],
};

/// Raw tyre pressure counts scale to kPa
const TYRE_SCALE: f64 = 1.726_889_5;

static TYRE_PRESSURES: PidRequest = PidRequest {
    key: "tyre_pressures",
    description: "tyre pressures, all four corners",
    header: "743",
    command: "03220E25",
    response_prefix: &[0x62, 0x0E, 0x25],
    expect_len: 7,
    frames_hint: Some(1),
    signals: &[
        SignalSpec {
            name: "tyre_pressure_fl",
            unit: Some("kPa"),
            decoder: Decoder::Unsigned {
                offset: 3,
                len: 1,
                scale: TYRE_SCALE,
                bias: 0.0,
            },
            range: Some((100.0, 400.0)),
        },
        SignalSpec {
            name: "tyre_pressure_fr",
            unit: Some("kPa"),
            decoder: Decoder::Unsigned {
                offset: 4,
                len: 1,
                scale: TYRE_SCALE,
                bias: 0.0,
            },
            range: Some((100.0, 400.0)),
        },
        SignalSpec {
            name: "tyre_pressure_rl",
            unit: Some("kPa"),
            decoder: Decoder::Unsigned {
                offset: 5,
                len: 1,
                scale: TYRE_SCALE,
                bias: 0.0,
            },
            range: Some((100.0, 400.0)),
        },
        SignalSpec {
            name: "tyre_pressure_rr",
            unit: Some("kPa"),
            decoder: Decoder::Unsigned {
                offset: 6,
                len: 1,
                scale: TYRE_SCALE,
                bias: 0.0,
            },
            range: Some((100.0, 400.0)),
        },
    ],
};

static BATTERY_12V: PidRequest = PidRequest {
    key: "battery_12v",
    description: "12V auxiliary battery voltage",
    header: "797",
    command: "03221103",
    response_prefix: &[0x62, 0x11, 0x03],
    expect_len: 4,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "battery_12v_voltage",
        unit: Some("V"),
        decoder: Decoder::Unsigned {
            offset: 3,
            len: 1,
            scale: 0.08,
            bias: 0.0,
        },
        range: Some((8.0, 16.0)),
    }],
};

static MOTOR_RPM: PidRequest = PidRequest {
    key: "motor_rpm",
    description: "traction motor speed",
    header: "797",
    command: "03221255",
    response_prefix: &[0x62, 0x12, 0x55],
    expect_len: 5,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "motor_rpm",
        unit: Some("rpm"),
        decoder: Decoder::Signed {
            offset: 3,
            len: 2,
            scale: 0.5,
            bias: 0.0,
        },
        range: Some((-12_000.0, 12_000.0)),
    }],
};

static MOTOR_POWER: PidRequest = PidRequest {
    key: "motor_power",
    description: "traction motor power",
    header: "797",
    command: "03221146",
    response_prefix: &[0x62, 0x11, 0x46],
    expect_len: 5,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "motor_power_kw",
        unit: Some("kW"),
        decoder: Decoder::Signed {
            offset: 3,
            len: 2,
            scale: 0.05,
            bias: 0.0,
        },
        range: Some((-100.0, 100.0)),
    }],
};

static AMBIENT_TEMP: PidRequest = PidRequest {
    key: "ambient_temp",
    description: "ambient air temperature",
    header: "797",
    command: "0322115D",
    response_prefix: &[0x62, 0x11, 0x5D],
    expect_len: 4,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "ambient_temp_c",
        unit: Some("°C"),
        decoder: Decoder::Unsigned {
            offset: 3,
            len: 1,
            scale: 0.5,
            bias: -40.0,
        },
        range: Some((-40.0, 60.0)),
    }],
};

static GEAR_POSITION: PidRequest = PidRequest {
    key: "gear_position",
    description: "shift lever position",
    header: "797",
    command: "03221156",
    response_prefix: &[0x62, 0x11, 0x56],
    expect_len: 4,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "gear_position",
        unit: None,
        decoder: Decoder::Map {
            offset: 3,
            table: &[
                (1, "park"),
                (2, "reverse"),
                (3, "neutral"),
                (4, "drive"),
                (7, "b"),
            ],
        },
        range: None,
    }],
};

static DRIVE_MODE: PidRequest = PidRequest {
    key: "drive_mode",
    description: "eco and e-pedal switches",
    header: "797",
    command: "0322114E",
    response_prefix: &[0x62, 0x11, 0x4E],
    expect_len: 4,
    frames_hint: Some(1),
    signals: &[
        SignalSpec {
            name: "eco_mode",
            unit: None,
            decoder: Decoder::Flag {
                offset: 3,
                mask: 0x10,
            },
            range: None,
        },
        SignalSpec {
            name: "e_pedal_mode",
            unit: None,
            decoder: Decoder::Flag {
                offset: 3,
                mask: 0x04,
            },
            range: None,
        },
    ],
};

static VEHICLE_SPEED: PidRequest = PidRequest {
    key: "vehicle_speed",
    description: "vehicle speed (standard mode 01)",
    header: "7DF",
    command: "010D",
    response_prefix: &[0x41, 0x0D],
    expect_len: 3,
    frames_hint: Some(1),
    signals: &[SignalSpec {
        name: "vehicle_speed_kmh",
        unit: Some("km/h"),
        decoder: Decoder::Unsigned {
            offset: 2,
            len: 1,
            scale: 1.0,
            bias: 0.0,
        },
        range: Some((0.0, 255.0)),
    }],
};

static FULL_SET: [&PidRequest; 10] = [
    &LBC,
    &ODOMETER,
    &TYRE_PRESSURES,
    &BATTERY_12V,
    &MOTOR_RPM,
    &MOTOR_POWER,
    &AMBIENT_TEMP,
    &GEAR_POSITION,
    &DRIVE_MODE,
    &VEHICLE_SPEED,
];

/// Battery and range essentials, for slow links or charge monitoring
static REDUCED_SET: [&PidRequest; 3] = [&LBC, &BATTERY_12V, &ODOMETER];

pub fn full_set() -> &'static [&'static PidRequest] {
    &FULL_SET
}

pub fn reduced_set() -> &'static [&'static PidRequest] {
    &REDUCED_SET
}

pub fn lookup(key: &str) -> Option<&'static PidRequest> {
    FULL_SET.iter().find(|r| r.key == key).copied()
}
