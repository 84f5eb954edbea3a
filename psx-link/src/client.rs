use std::collections::BTreeMap;

use crate::{
    Error,
    codec::{
        RegisterCode,
        RegisterValue,
        WireLine,
        encode_command,
    },
    composer::{
        AirUpdate,
        DoorsWrite,
        FuelPayload,
        PowerUpdate,
        Weight,
        compose_air_write,
        compose_doors_write,
        compose_fuel_payload,
        compose_power_write,
        compose_zero_fuel_weight,
    },
    registers::{
        AirState,
        Door,
        DoorMap,
        DoorState,
        PowerState,
        decode_air,
        decode_doors,
        decode_power,
    },
    resolver,
    shadow::RegisterShadow,
    transport::{
        LineSink,
        Transport,
    },
};

/// Value written to the door control register to take control of the doors.
pub const TAKE_DOOR_CONTROL: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerWrite {
    /// The value the update was applied to.
    pub base: u32,
    pub next: u32,
    /// Only set if verification was requested.
    pub verified: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DoorsWriteOutcome {
    pub written: DoorsWrite,
    pub verified: Option<bool>,
}

/// Typed PSX operations on top of a [`LineSink`].
///
/// Successful reads and writes of shadowed registers are recorded in the
/// [`RegisterShadow`].
#[derive(Clone, Debug)]
pub struct PsxClient<S = Transport> {
    sink: S,
    shadow: RegisterShadow,
}

impl<S: LineSink> PsxClient<S> {
    pub fn new(sink: S, shadow: RegisterShadow) -> Self {
        Self { sink, shadow }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn shadow(&self) -> &RegisterShadow {
        &self.shadow
    }

    /// Sends raw lines and returns the raw reply.
    pub async fn send(&self, lines: &[WireLine]) -> Result<String, Error> {
        Ok(self.sink.send_lines(lines).await?)
    }

    pub async fn write(&self, code: RegisterCode, value: RegisterValue) -> Result<(), Error> {
        let line = encode_command(code, &value);
        tracing::debug!(%line, "write register");
        self.sink.send_lines(&[line]).await?;
        Ok(())
    }

    async fn write_shadowed(&self, code: RegisterCode, value: u32) -> Result<(), Error> {
        self.write(code, value.into()).await?;
        self.shadow.record(code, value);
        Ok(())
    }

    pub async fn read_register(&self, code: RegisterCode) -> Result<u32, Error> {
        let value = resolver::read_register(&self.sink, code).await?;
        self.shadow.record(code, value);
        Ok(value)
    }

    /// Reads `code` back and compares it with what was written.
    pub async fn verify(&self, code: RegisterCode, expected: u32) -> Result<bool, Error> {
        let actual = self.read_register(code).await?;
        if actual != expected {
            tracing::warn!(%code, expected, actual, "register read-back differs");
        }
        Ok(actual == expected)
    }

    pub async fn power(&self) -> Result<PowerState, Error> {
        Ok(decode_power(self.read_register(RegisterCode::POWER).await?))
    }

    /// Applies `update` to the power register.
    ///
    /// Without a `base` the register is read right before writing, which keeps
    /// the window for clobbering concurrent changes in PSX small.
    pub async fn set_power(
        &self,
        base: Option<u32>,
        update: &PowerUpdate,
        verify: bool,
    ) -> Result<PowerWrite, Error> {
        let base = match base {
            Some(base) => base,
            None => self.read_register(RegisterCode::POWER).await?,
        };
        let next = compose_power_write(base, update);

        self.write_shadowed(RegisterCode::POWER, next).await?;

        let verified = if verify {
            Some(self.verify(RegisterCode::POWER, next).await?)
        }
        else {
            None
        };

        Ok(PowerWrite {
            base,
            next,
            verified,
        })
    }

    pub async fn air(&self) -> Result<AirState, Error> {
        Ok(decode_air(self.read_register(RegisterCode::AIR).await?))
    }

    /// Writes the air register with exactly the given state. Returns the
    /// written value.
    pub async fn set_air(&self, state: AirState) -> Result<u32, Error> {
        let value = compose_air_write(
            0,
            &AirUpdate {
                bleed: Some(state.bleed),
                aircon: Some(state.aircon),
            },
        );
        self.write_shadowed(RegisterCode::AIR, value).await?;
        Ok(value)
    }

    pub async fn doors(&self) -> Result<BTreeMap<Door, DoorState>, Error> {
        let open = self.read_register(RegisterCode::DOORS_OPEN).await?;
        let manual = self.read_register(RegisterCode::DOORS_MANUAL).await?;
        Ok(decode_doors(open, manual))
    }

    /// Writes the door registers whose map is given. Open is written first.
    pub async fn set_doors(
        &self,
        open: Option<&DoorMap>,
        manual: Option<&DoorMap>,
        verify: bool,
    ) -> Result<DoorsWriteOutcome, Error> {
        let written = compose_doors_write(open, manual);
        let registers = [
            (RegisterCode::DOORS_OPEN, written.open),
            (RegisterCode::DOORS_MANUAL, written.manual),
        ];

        for (code, value) in registers {
            if let Some(value) = value {
                self.write_shadowed(code, value).await?;
            }
        }

        let mut verified = None;
        if verify {
            let mut all = true;
            for (code, value) in registers {
                if let Some(value) = value {
                    all &= self.verify(code, value).await?;
                }
            }
            verified = Some(all);
        }

        Ok(DoorsWriteOutcome { written, verified })
    }

    pub async fn take_door_control(&self) -> Result<(), Error> {
        self.write(RegisterCode::DOOR_CONTROL, TAKE_DOOR_CONTROL.into())
            .await
    }

    /// Returns the written weight in pounds.
    pub async fn set_zero_fuel_weight(&self, weight: Weight) -> Result<u32, Error> {
        let lbs = compose_zero_fuel_weight(weight)?;
        self.write(RegisterCode::ZERO_FUEL_WEIGHT, lbs.into()).await?;
        Ok(lbs)
    }

    /// Distributes `total_kg` over the main tanks. The tanks payload is
    /// written first, the preselect payload is not written if that fails.
    pub async fn set_fuel_total(&self, total_kg: f64) -> Result<FuelPayload, Error> {
        let payload = compose_fuel_payload(total_kg)?;
        self.write(
            RegisterCode::FUEL_TANKS,
            RegisterValue::text(payload.tanks.as_str())?,
        )
        .await?;
        self.write(
            RegisterCode::FUEL_PRESELECT,
            RegisterValue::text(payload.preselect.as_str())?,
        )
        .await?;
        Ok(payload)
    }

    pub async fn set_fuel_tanks(&self, payload: &str) -> Result<(), Error> {
        self.write(RegisterCode::FUEL_TANKS, RegisterValue::text(payload)?)
            .await
    }

    pub async fn set_fuel_preselect(&self, payload: &str) -> Result<(), Error> {
        self.write(RegisterCode::FUEL_PRESELECT, RegisterValue::text(payload)?)
            .await
    }

    pub async fn prefuel(&self, entry: &str) -> Result<(), Error> {
        self.write(RegisterCode::PREFUEL, RegisterValue::text(entry)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Error,
        client::PsxClient,
        codec::RegisterCode,
        composer::{
            PowerUpdate,
            ValidationError,
            Weight,
        },
        registers::{
            AirState,
            Door,
            DoorMap,
            ExtPower,
            ShoreBreaker,
        },
        resolver::tests::FakeSink,
        shadow::{
            Freshness,
            RegisterShadow,
        },
    };

    fn client(sink: &FakeSink) -> PsxClient<FakeSink> {
        PsxClient::new(sink.clone(), RegisterShadow::default())
    }

    #[tokio::test]
    async fn set_power_reads_the_base_first() {
        let sink = FakeSink::default().with_register(RegisterCode::POWER, "Qi132=134217728");
        let client = client(&sink);

        let write = client
            .set_power(
                None,
                &PowerUpdate {
                    ext1: Some(ExtPower::Connected),
                    ..Default::default()
                },
                false,
            )
            .await
            .unwrap();

        assert_eq!(write.base, 134217728);
        assert_eq!(write.next, 134217728 | 1 | 1 << 8);
        assert_eq!(write.verified, None);
        assert_eq!(
            sink.sent_lines(),
            vec!["Q=Qi132=?".to_owned(), format!("Qi132={}", write.next)]
        );

        let shadowed = client.shadow().power();
        assert_eq!(shadowed.freshness, Freshness::Fresh);
        assert_eq!(shadowed.value.unwrap().ext1, ExtPower::Connected);
    }

    #[tokio::test]
    async fn set_power_with_base_skips_the_read() {
        let sink = FakeSink::default();
        let client = client(&sink);

        let write = client
            .set_power(
                Some(0),
                &PowerUpdate {
                    ssb: Some(ShoreBreaker::Open),
                    ..Default::default()
                },
                false,
            )
            .await
            .unwrap();

        assert_eq!(write.next, 1 << 30);
        assert_eq!(sink.sent_lines(), vec!["Qi132=1073741824"]);
    }

    #[tokio::test]
    async fn verification_reports_mismatches() {
        // PSX keeps answering with the old value
        let sink = FakeSink::default().with_register(RegisterCode::POWER, "Qi132=0");
        let client = client(&sink);

        let write = client
            .set_power(
                Some(0),
                &PowerUpdate {
                    ext2: Some(ExtPower::Available),
                    ..Default::default()
                },
                true,
            )
            .await
            .unwrap();
        assert_eq!(write.verified, Some(false));
    }

    #[tokio::test]
    async fn it_writes_doors() {
        let sink = FakeSink::default().with_register(RegisterCode::DOORS_OPEN, "Qi180=8");
        let client = client(&sink);

        let open = DoorMap::default().with(Door::L1, true);
        let outcome = client.set_doors(Some(&open), None, true).await.unwrap();

        assert_eq!(outcome.written.open, Some(8));
        assert_eq!(outcome.written.manual, None);
        assert_eq!(outcome.verified, Some(true));
        assert_eq!(sink.sent_lines(), vec!["Qi180=8", "Q=Qi180=?"]);
    }

    #[tokio::test]
    async fn air_is_written_from_zero() {
        let sink = FakeSink::default();
        let value = client(&sink)
            .set_air(AirState {
                bleed: false,
                aircon: true,
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(sink.sent_lines(), vec!["Qi174=2"]);
    }

    #[tokio::test]
    async fn it_writes_fuel() {
        let sink = FakeSink::default();
        let client = client(&sink);

        client.set_fuel_total(1000.0).await.unwrap();
        client.prefuel("1234").await.unwrap();
        client.take_door_control().await.unwrap();
        client
            .set_zero_fuel_weight(Weight::Pounds(395000.0))
            .await
            .unwrap();

        assert_eq!(
            sink.sent_lines(),
            vec![
                "Qs438=d5513;5513;5513;5513;0;0;0;0;0;22050;2802;",
                "Qs439=5513;5513;5513;5513;0;0;0;0;0;",
                "Qi220=1234",
                "Qi179=32",
                "Qi123=395000",
            ]
        );
    }

    #[tokio::test]
    async fn raw_payloads_must_not_be_empty() {
        let sink = FakeSink::default();
        let error = client(&sink).set_fuel_tanks("").await.unwrap_err();
        assert!(matches!(
            error,
            Error::Validation(ValidationError::Encode(_))
        ));
        assert!(sink.sent_lines().is_empty());
    }
}
