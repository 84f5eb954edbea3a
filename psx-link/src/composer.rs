//! Computes register values for writes.
//!
//! PSX only accepts whole-register writes, so every change to a single bit is a
//! read-modify-write. The composer does the modify part: it never talks to
//! PSX and trusts that the base value it is given is a fresh snapshot.

use crate::{
    codec::{
        EncodeError,
        kg_to_lbs,
        to_tenth_string,
    },
    registers::{
        AirBits,
        DoorMap,
        ExtPower,
        PowerBits,
        ShoreBreaker,
        Side,
    },
};

/// Fixed marker field at the end of the fuel tanks payload.
const FUEL_TANKS_MARKER: &str = "2802";

/// Number of tank slots after the four main tanks, always written as zero.
const FUEL_ZERO_SLOTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Fuel quantity must be a finite number greater than zero: {total_kg}")]
    NonPositiveFuel { total_kg: f64 },
    #[error("Weight must be a finite number greater than zero: {value}")]
    InvalidWeight { value: f64 },
    #[error("Heading must be a finite number of degrees: {value}")]
    InvalidHeading { value: f64 },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Power fields to change. `None` keeps whatever the base value has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PowerUpdate {
    pub ext1: Option<ExtPower>,
    pub ext2: Option<ExtPower>,
    pub ssb: Option<ShoreBreaker>,
}

impl PowerUpdate {
    pub fn is_empty(&self) -> bool {
        self.ext1.is_none() && self.ext2.is_none() && self.ssb.is_none()
    }
}

pub fn compose_power_write(base: u32, update: &PowerUpdate) -> u32 {
    let mut bits = PowerBits::from_bits_retain(base);

    for (side, state) in [(Side::One, update.ext1), (Side::Two, update.ext2)] {
        if let Some(state) = state {
            let (gen_run, closed) = state.to_bits();
            bits.set(side.gen_bit(), gen_run);
            bits.set(side.closed_bit(), closed);
        }
    }

    if let Some(ssb) = update.ssb {
        bits.set(PowerBits::CLOSED_SSB, ssb == ShoreBreaker::Open);
    }

    bits.bits()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AirUpdate {
    pub bleed: Option<bool>,
    pub aircon: Option<bool>,
}

pub fn compose_air_write(base: u32, update: &AirUpdate) -> u32 {
    let mut bits = AirBits::from_bits_retain(base);
    if let Some(bleed) = update.bleed {
        bits.set(AirBits::BLEED, bleed);
    }
    if let Some(aircon) = update.aircon {
        bits.set(AirBits::AIRCON, aircon);
    }
    bits.bits()
}

/// Door register values to write. A register is only written if its map was
/// given.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DoorsWrite {
    pub open: Option<u32>,
    pub manual: Option<u32>,
}

/// Door registers are always built from zero. Doors that aren't set in a map
/// are written as closed (or armed).
pub fn compose_doors_write(open: Option<&DoorMap>, manual: Option<&DoorMap>) -> DoorsWrite {
    DoorsWrite {
        open: open.map(DoorMap::to_register),
        manual: manual.map(DoorMap::to_register),
    }
}

/// Payloads for the fuel tanks and fuel preselect registers.
#[derive(Clone, Debug, PartialEq)]
pub struct FuelPayload {
    pub total_lbs: f64,
    pub tanks: String,
    pub preselect: String,
}

/// Splits `total_kg` evenly over the four main tanks.
///
/// The upper sanity bound is the caller's business.
pub fn compose_fuel_payload(total_kg: f64) -> Result<FuelPayload, ValidationError> {
    if !total_kg.is_finite() || total_kg <= 0.0 {
        return Err(ValidationError::NonPositiveFuel { total_kg });
    }

    let total_lbs = kg_to_lbs(total_kg);
    let main = to_tenth_string(total_lbs / 4.0);

    let mut slots = Vec::with_capacity(4 + FUEL_ZERO_SLOTS);
    slots.extend(std::iter::repeat_n(main.as_str(), 4));
    slots.extend(std::iter::repeat_n("0", FUEL_ZERO_SLOTS));
    let preselect = format!("{};", slots.join(";"));

    let tanks = format!(
        "d{preselect}{};{FUEL_TANKS_MARKER};",
        to_tenth_string(total_lbs)
    );

    Ok(FuelPayload {
        total_lbs,
        tanks,
        preselect,
    })
}

/// Zero fuel weight in whole pounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Weight {
    Kilograms(f64),
    Pounds(f64),
}

pub fn compose_zero_fuel_weight(weight: Weight) -> Result<u32, ValidationError> {
    let lbs = match weight {
        Weight::Kilograms(kg) => {
            if !kg.is_finite() || kg <= 0.0 {
                return Err(ValidationError::InvalidWeight { value: kg });
            }
            kg_to_lbs(kg)
        }
        Weight::Pounds(lbs) => lbs.round(),
    };

    if !lbs.is_finite() || lbs <= 0.0 || lbs > u32::MAX as f64 {
        return Err(ValidationError::InvalidWeight { value: lbs });
    }

    Ok(lbs as u32)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        codec::kg_to_lbs,
        composer::{
            AirUpdate,
            PowerUpdate,
            ValidationError,
            Weight,
            compose_air_write,
            compose_doors_write,
            compose_fuel_payload,
            compose_power_write,
            compose_zero_fuel_weight,
        },
        registers::{
            Door,
            DoorMap,
            ExtPower,
            ShoreBreaker,
            decode_air,
            decode_power,
        },
    };

    const EXT_STATES: [Option<ExtPower>; 4] = [
        None,
        Some(ExtPower::NotAvailable),
        Some(ExtPower::Available),
        Some(ExtPower::Connected),
    ];
    const SSB_STATES: [Option<ShoreBreaker>; 3] =
        [None, Some(ShoreBreaker::Open), Some(ShoreBreaker::Closed)];

    #[test]
    fn power_writes_round_trip_through_the_decoder() {
        let bases = [
            0,
            u32::MAX,
            134217728,
            1 << 8,
            1 << 3 | 1 << 30,
            0xdead_beef,
        ];

        for base in bases {
            let before = decode_power(base);
            for ext1 in EXT_STATES {
                for ext2 in EXT_STATES {
                    for ssb in SSB_STATES {
                        let update = PowerUpdate { ext1, ext2, ssb };
                        let next = compose_power_write(base, &update);
                        let after = decode_power(next);

                        assert_eq!(after.ext1, ext1.unwrap_or(before.ext1));
                        assert_eq!(after.ext2, ext2.unwrap_or(before.ext2));
                        assert_eq!(after.ssb, ssb.unwrap_or(before.ssb));

                        // bits PSX owns are left alone
                        let mask = 1 | 1 << 3 | 1 << 8 | 1 << 11 | 1 << 30;
                        assert_eq!(next & !mask, base & !mask);
                    }
                }
            }
        }
    }

    #[test]
    fn empty_power_update_is_identity() {
        assert_eq!(compose_power_write(0x1234_5678, &PowerUpdate::default()), 0x1234_5678);
    }

    #[test]
    fn air_writes_preserve_the_base() {
        let next = compose_air_write(
            0b1100,
            &AirUpdate {
                bleed: Some(true),
                aircon: None,
            },
        );
        assert_eq!(next, 0b1101);
        assert!(decode_air(next).bleed);
        assert!(!decode_air(next).aircon);

        let next = compose_air_write(
            0b11,
            &AirUpdate {
                bleed: None,
                aircon: Some(false),
            },
        );
        assert_eq!(next, 0b01);
    }

    #[test]
    fn door_writes_are_built_from_scratch() {
        let open = DoorMap::default().with(Door::L1, true);
        let write = compose_doors_write(Some(&open), None);
        assert_eq!(write.open, Some(1 << 3));
        assert_eq!(write.manual, None);

        let manual = DoorMap::default().with(Door::NoseCargo, true).with(Door::R5, true);
        let write = compose_doors_write(None, Some(&manual));
        assert_eq!(write.open, None);
        assert_eq!(write.manual, Some(1 | 1 << 19));
    }

    #[test]
    fn it_composes_fuel_payloads() {
        let payload = compose_fuel_payload(1000.0).unwrap();
        assert_eq!(payload.total_lbs, 2205.0);
        assert_eq!(payload.preselect, "5513;5513;5513;5513;0;0;0;0;0;");
        assert_eq!(payload.tanks, "d5513;5513;5513;5513;0;0;0;0;0;22050;2802;");
    }

    #[test]
    fn fuel_split_sums_to_the_total() {
        for total_kg in [0.1, 1.0, 333.3, 1000.0, 12345.6, 54321.0, 173_000.0, 250_000.0] {
            let payload = compose_fuel_payload(total_kg).unwrap();
            let mains: f64 = payload
                .preselect
                .split(';')
                .take(4)
                .map(|tenths| tenths.parse::<f64>().unwrap() / 10.0)
                .sum();
            assert_abs_diff_eq!(mains, kg_to_lbs(total_kg), epsilon = 0.4);
        }
    }

    #[test]
    fn fuel_must_be_positive() {
        for total_kg in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                compose_fuel_payload(total_kg),
                Err(ValidationError::NonPositiveFuel { .. })
            ));
        }
    }

    #[test]
    fn it_composes_zero_fuel_weights() {
        assert_eq!(compose_zero_fuel_weight(Weight::Pounds(395000.4)).unwrap(), 395000);
        assert_eq!(compose_zero_fuel_weight(Weight::Kilograms(1000.0)).unwrap(), 2205);
        assert!(compose_zero_fuel_weight(Weight::Pounds(f64::NAN)).is_err());
        assert!(compose_zero_fuel_weight(Weight::Kilograms(-5.0)).is_err());
        assert!(compose_zero_fuel_weight(Weight::Pounds(0.0)).is_err());
    }
}
