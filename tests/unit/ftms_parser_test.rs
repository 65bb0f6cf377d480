//! Unit tests for FTMS, Cycling Power and Heart Rate frame parsing.

use ridelink::sensors::ftms::{
    parse_cycling_power_measurement, parse_heart_rate_measurement, parse_indoor_bike_data,
};
use ridelink::sensors::types::FrameError;

#[test]
fn test_parse_indoor_bike_data_minimal() {
    // Flags: 0x0000 (only instantaneous speed present)
    // Speed: 0 km/h
    let data = [0x00, 0x00, 0x00, 0x00];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(result.speed_kmh, Some(0.0));
    assert!(result.power_watts.is_none());
    assert!(result.cadence_rpm.is_none());
}

#[test]
fn test_parse_indoor_bike_data_speed_only() {
    // Flags: 0x0000 (only instantaneous speed)
    // Speed: 2500 = 25.00 km/h
    let data = [0x00, 0x00, 0xC4, 0x09];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert!((result.speed_kmh.unwrap() - 25.0).abs() < 0.01);
}

#[test]
fn test_parse_indoor_bike_data_full() {
    // Flags: 0x0044 (cadence + power)
    // Speed: 3500 = 35.00 km/h
    // Cadence: 190 = 95 RPM
    // Power: 300W
    let data = [0x44, 0x00, 0xAC, 0x0D, 0xBE, 0x00, 0x2C, 0x01];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert!((result.speed_kmh.unwrap() - 35.0).abs() < 0.01);
    assert_eq!(result.cadence_rpm, Some(95.0));
    assert_eq!(result.power_watts, Some(300));
}

#[test]
fn test_parse_indoor_bike_data_half_rpm_cadence() {
    // Flags: 0x0004 (cadence), cadence raw 181 = 90.5 RPM
    let data = [0x04, 0x00, 0xD0, 0x07, 0xB5, 0x00];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(result.cadence_rpm, Some(90.5));
}

#[test]
fn test_parse_indoor_bike_data_negative_power_clamped() {
    // Flags: 0x0040 (power only), speed 0, power -50 as sint16
    let data = [0x40, 0x00, 0x00, 0x00, 0xCE, 0xFF];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(result.power_watts, Some(0));
}

#[test]
fn test_parse_indoor_bike_data_more_data_flag() {
    // Flags: 0x0001 (more data = no instantaneous speed)
    let data = [0x01, 0x00];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert!(result.speed_kmh.is_none());
}

#[test]
fn test_parse_indoor_bike_data_total_distance() {
    // Flags: 0x0011 (more data + total distance)
    // Distance: 0x012345 = 74565 m (uint24)
    let data = [0x11, 0x00, 0x45, 0x23, 0x01];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert!(result.speed_kmh.is_none());
    assert_eq!(result.total_distance_m, Some(74_565));
}

#[test]
fn test_parse_indoor_bike_data_energy_sentinel() {
    // Flags: 0x0101 (more data + expended energy)
    // Total energy: 0xFFFF (not available)
    // Energy per hour: 0xFFFF (not available)
    // Energy per minute: 5
    let data = [0x01, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x05];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(result.total_energy_kcal, None);
    assert_eq!(result.energy_per_hour_kcal, None);
    assert_eq!(result.energy_per_minute_kcal, Some(5));
}

#[test]
fn test_parse_indoor_bike_data_energy_present() {
    // Flags: 0x0101, total 120 kcal, 600 kcal/h, 10 kcal/min
    let data = [0x01, 0x01, 0x78, 0x00, 0x58, 0x02, 0x0A];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(result.total_energy_kcal, Some(120));
    assert_eq!(result.energy_per_hour_kcal, Some(600));
}

#[test]
fn test_parse_indoor_bike_data_heart_rate_range() {
    // Flags: 0x0201 (more data + heart rate)
    let accepted = parse_indoor_bike_data(&[0x01, 0x02, 0x8C]).unwrap();
    assert_eq!(accepted.heart_rate_bpm, Some(140));

    let zero = parse_indoor_bike_data(&[0x01, 0x02, 0x00]).unwrap();
    assert_eq!(zero.heart_rate_bpm, None);

    let too_high = parse_indoor_bike_data(&[0x01, 0x02, 0xFA]).unwrap();
    assert_eq!(too_high.heart_rate_bpm, None);
}

#[test]
fn test_parse_indoor_bike_data_truncated_tail_is_skipped() {
    // Flags: 0x0044 (cadence + power), speed 30 km/h, cadence 90 RPM,
    // power bytes missing
    let data = [0x44, 0x00, 0xB8, 0x0B, 0xB4, 0x00];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert!((result.speed_kmh.unwrap() - 30.0).abs() < 0.01);
    assert_eq!(result.cadence_rpm, Some(90.0));
    assert_eq!(result.power_watts, None);
}

#[test]
fn test_parse_indoor_bike_data_truncated_field_does_not_shift_later_fields() {
    // Flags: 0x0801 (more data + elapsed time), only one of two elapsed bytes
    let data = [0x01, 0x08, 0x3C];
    let result = parse_indoor_bike_data(&data).unwrap();

    assert_eq!(result.elapsed_time_s, None);
}

#[test]
fn test_parse_indoor_bike_data_invalid_too_short() {
    assert_eq!(
        parse_indoor_bike_data(&[0x44]),
        Err(FrameError::TooShort {
            characteristic: "Indoor Bike Data",
            needed: 2,
            actual: 1
        })
    );
    assert!(parse_indoor_bike_data(&[]).is_err());
}

#[test]
fn test_parse_indoor_bike_data_is_deterministic() {
    let data = [0x44, 0x02, 0xAC, 0x0D, 0xBE, 0x00, 0x2C, 0x01, 0x91];
    assert_eq!(
        parse_indoor_bike_data(&data).unwrap(),
        parse_indoor_bike_data(&data).unwrap()
    );
}

#[test]
fn test_parse_cycling_power_measurement() {
    // Flags: 0x0000, power 250 W
    let result = parse_cycling_power_measurement(&[0x00, 0x00, 0xFA, 0x00]).unwrap();
    assert_eq!(result.power_watts, 250);

    // Negative power (-20 W) clamps to 0
    let negative = parse_cycling_power_measurement(&[0x00, 0x00, 0xEC, 0xFF]).unwrap();
    assert_eq!(negative.power_watts, 0);

    assert!(parse_cycling_power_measurement(&[0x00, 0x00, 0xFA]).is_err());
}

#[test]
fn test_parse_heart_rate_measurement_formats() {
    // Flags: 0x00 (8-bit value), 72 bpm
    let hr8 = parse_heart_rate_measurement(&[0x00, 0x48]).unwrap();
    assert_eq!(hr8.heart_rate_bpm, 72);

    // Flags: 0x01 (16-bit value), 300 bpm passes through unfiltered
    let hr16 = parse_heart_rate_measurement(&[0x01, 0x2C, 0x01]).unwrap();
    assert_eq!(hr16.heart_rate_bpm, 300);

    // Flags: 0x06 (contact supported + detected)
    let contact = parse_heart_rate_measurement(&[0x06, 0x50]).unwrap();
    assert!(contact.sensor_contact);

    assert!(parse_heart_rate_measurement(&[0x01, 0x2C]).is_err());
}
