use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use super::decision::{decide, ControlDecision, DecisionConfig, DecisionInput};
use crate::domain::{
    Command, CommandKind, CommandStatus, GeoLocation, PriceLevel, SensorReading, WeatherSnapshot, ZoneId,
    ZonePreferences,
};
use crate::forecast::WeatherSource;
use crate::hardware::ZoneMaster;
use crate::pricing::EnergyPricer;
use crate::repo::PersistenceSink;
use crate::simulation::OutdoorInput;

/// A zone as seen by the control loop
#[derive(Clone)]
pub struct ControlledZone {
    pub master: ZoneMaster,
    /// Used when the sink has no stored preferences for the zone
    pub default_preferences: ZonePreferences,
}

impl ControlledZone {
    pub fn zone_id(&self) -> ZoneId {
        self.master.zone_id()
    }
}

#[derive(Clone)]
pub struct LiveWeather {
    pub source: Arc<dyn WeatherSource>,
    pub location: GeoLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ZoneOutcome {
    Decided {
        decision: ControlDecision,
        wrote_target: bool,
    },
    /// Zone unreachable this cycle; retried on the next one
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    pub weather: Option<WeatherSnapshot>,
    pub price_level: PriceLevel,
    pub zones: Vec<(ZoneId, ZoneOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, zone_id: ZoneId) -> Option<&ZoneOutcome> {
        self.zones.iter().find(|(id, _)| *id == zone_id).map(|(_, o)| o)
    }

    /// Zones that did not reach a decision
    pub fn unsettled(&self) -> usize {
        self.zones
            .iter()
            .filter(|(_, o)| !matches!(o, ZoneOutcome::Decided { .. }))
            .count()
    }
}

/// Poll all zones, decide, write targets.
pub struct LiveControlLoop {
    zones: Vec<ControlledZone>,
    decision: DecisionConfig,
    target_write_tolerance_c: f64,
    timezone: Tz,
    weather: Option<LiveWeather>,
    pricer: Arc<dyn EnergyPricer>,
    sink: Arc<dyn PersistenceSink>,
    outdoor: Option<OutdoorInput>,
}

impl LiveControlLoop {
    pub fn new(
        zones: Vec<ControlledZone>,
        decision: DecisionConfig,
        target_write_tolerance_c: f64,
        timezone: Tz,
        pricer: Arc<dyn EnergyPricer>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            zones,
            decision,
            target_write_tolerance_c,
            timezone,
            weather: None,
            pricer,
            sink,
            outdoor: None,
        }
    }

    pub fn with_weather(mut self, weather: LiveWeather) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Fetched outdoor temperatures are also pushed into in-process simulators.
    pub fn with_outdoor_input(mut self, outdoor: OutdoorInput) -> Self {
        self.outdoor = Some(outdoor);
        self
    }

    pub fn zones(&self) -> &[ControlledZone] {
        &self.zones
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<&ControlledZone> {
        self.zones.iter().find(|z| z.zone_id() == zone_id)
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let weather = self.fetch_weather().await;
        if let (Some(snapshot), Some(outdoor)) = (&weather, &self.outdoor) {
            outdoor.set(snapshot.outdoor_temp_c);
        }
        let price_level = self.pricer.price_level(now);

        let zones = join_all(
            self.zones
                .iter()
                .map(|zone| async move { (zone.zone_id(), self.control_zone(zone, now, weather, price_level).await) }),
        )
        .await;

        CycleReport {
            at: now,
            weather,
            price_level,
            zones,
        }
    }

    async fn fetch_weather(&self) -> Option<WeatherSnapshot> {
        let live = self.weather.as_ref()?;
        match live.source.current(&live.location).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, location = %live.location.query(), "weather unavailable, deciding without it");
                None
            }
        }
    }

    async fn preferences(&self, zone: &ControlledZone) -> ZonePreferences {
        match self.sink.preferences(zone.zone_id()).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => zone.default_preferences.clone(),
            Err(e) => {
                warn!(zone_id = zone.zone_id(), error = %e, "preferences lookup failed, using configured defaults");
                zone.default_preferences.clone()
            }
        }
    }

    async fn control_zone(
        &self,
        zone: &ControlledZone,
        now: DateTime<Utc>,
        weather: Option<WeatherSnapshot>,
        price_level: PriceLevel,
    ) -> ZoneOutcome {
        let zone_id = zone.zone_id();
        let snapshot = match zone.master.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_communication() => {
                warn!(zone_id, endpoint = %zone.master.endpoint(), error = %e, "zone unreachable, skipping cycle");
                return ZoneOutcome::Skipped { reason: e.to_string() };
            }
            Err(e) => {
                error!(zone_id, error = %e, "zone poll failed");
                return ZoneOutcome::Failed { reason: e.to_string() };
            }
        };

        if let Err(e) = self
            .sink
            .record_reading(SensorReading::from_snapshot(zone_id, now, &snapshot))
            .await
        {
            warn!(zone_id, error = %e, "failed to record sensor reading");
        }

        let preferences = self.preferences(zone).await;
        let input = DecisionInput {
            time_of_day: now.with_timezone(&self.timezone).time(),
            occupied: snapshot.occupancy,
            current_temp: snapshot.current_temp,
            heater_on: snapshot.heater_on,
            weather,
            price_level: Some(price_level),
        };
        let decision = match decide(&preferences, &self.decision, &input) {
            Ok(decision) => decision,
            Err(e) => {
                error!(zone_id, error = %e, "invalid zone preferences, no decision made");
                return ZoneOutcome::Failed { reason: e.to_string() };
            }
        };

        let mut wrote_target = false;
        if (snapshot.target_temp - decision.target_temp).abs() > self.target_write_tolerance_c {
            let result = zone.master.write_target_temp(decision.target_temp).await;
            let (status, detail) = match &result {
                Ok(()) => (CommandStatus::Success, None),
                Err(e) => {
                    warn!(zone_id, target_temp = decision.target_temp, error = %e, "target write failed");
                    (CommandStatus::Failed, Some(e.to_string()))
                }
            };
            wrote_target = result.is_ok();
            self.record_command(zone_id, now, CommandKind::SetTargetTemp, &decision, status, detail)
                .await;
        }

        if decision.heater_on != snapshot.heater_on {
            self.record_command(zone_id, now, CommandKind::HeaterIntent, &decision, CommandStatus::Success, None)
                .await;
        }

        info!(
            zone_id,
            current_temp = snapshot.current_temp,
            occupied = snapshot.occupancy,
            reported_target = snapshot.target_temp,
            target_temp = decision.target_temp,
            heater_on = decision.heater_on,
            outdoor_temp = weather.map(|w| w.outdoor_temp_c),
            %price_level,
            wrote_target,
            "zone decision"
        );

        ZoneOutcome::Decided {
            decision,
            wrote_target,
        }
    }

    async fn record_command(
        &self,
        zone_id: ZoneId,
        now: DateTime<Utc>,
        kind: CommandKind,
        decision: &ControlDecision,
        status: CommandStatus,
        detail: Option<String>,
    ) {
        let command = Command {
            zone_id,
            timestamp: now,
            kind,
            target_temp: decision.target_temp,
            heater_on: decision.heater_on,
            status,
            detail,
        };
        if let Err(e) = self.sink.record_command(command).await {
            warn!(zone_id, %kind, error = %e, "failed to record command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RegisterSnapshot, ScheduleEntry};
    use crate::forecast::StaticWeatherSource;
    use crate::hardware::{LocalLink, RegisterLink};
    use crate::modbus::RegisterStore;
    use crate::pricing::TimeOfUseTariff;
    use crate::repo::InMemoryRepository;
    use chrono::{NaiveTime, TimeZone};
    use std::time::Duration;

    fn prefs() -> ZonePreferences {
        let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        ZonePreferences {
            default_occupied_temp: 21.5,
            default_unoccupied_temp: 17.0,
            min_target_temp: 16.0,
            max_target_temp: 24.0,
            setback_setpoint: None,
            use_occupancy_for_heating: true,
            allow_weather_adjustment: true,
            schedule: vec![ScheduleEntry::new(t(7), 21.0, 17.0), ScheduleEntry::new(t(22), 19.0, 16.0)],
        }
    }

    fn decision_config() -> DecisionConfig {
        DecisionConfig {
            hysteresis_band_c: 0.5,
            weather: Some(crate::controller::decision::WeatherAdjustment {
                high_threshold_c: 15.0,
                low_threshold_c: 0.0,
                step_c: 1.0,
            }),
            price: None,
        }
    }

    struct Fixture {
        control: LiveControlLoop,
        store: Arc<RegisterStore>,
        link: Arc<LocalLink>,
        repo: Arc<InMemoryRepository>,
    }

    fn fixture(current_temp: f64, target_temp: f64) -> Fixture {
        let store = Arc::new(
            RegisterStore::new(&RegisterSnapshot {
                current_temp,
                target_temp,
                occupancy: true,
                heater_on: false,
            })
            .unwrap(),
        );
        let link = Arc::new(LocalLink::new(1, store.clone()));
        let master = ZoneMaster::new(1, link.clone() as Arc<dyn RegisterLink>, Duration::from_secs(1));
        let repo = Arc::new(InMemoryRepository::new());
        let control = LiveControlLoop::new(
            vec![ControlledZone {
                master,
                default_preferences: prefs(),
            }],
            decision_config(),
            0.1,
            chrono_tz::UTC,
            Arc::new(TimeOfUseTariff::default()),
            repo.clone(),
        );
        Fixture {
            control,
            store,
            link,
            repo,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_writes_target_and_records() {
        let f = fixture(18.0, 21.5);
        let report = f.control.run_cycle(at(8)).await;

        assert_eq!(
            report.outcome(1),
            Some(&ZoneOutcome::Decided {
                decision: ControlDecision {
                    target_temp: 21.0,
                    heater_on: true
                },
                wrote_target: true
            })
        );
        assert_eq!(f.store.target_temp(), 21.0);

        let commands = f.repo.commands(1, 10).await.unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .any(|c| c.kind == CommandKind::SetTargetTemp && c.status == CommandStatus::Success));
        assert!(commands.iter().any(|c| c.kind == CommandKind::HeaterIntent && c.heater_on));
        assert_eq!(f.repo.latest_reading(1).await.unwrap().unwrap().temperature, 18.0);
    }

    #[tokio::test]
    async fn test_no_write_when_target_matches() {
        let f = fixture(21.0, 21.0);
        let report = f.control.run_cycle(at(8)).await;
        assert!(matches!(
            report.outcome(1),
            Some(ZoneOutcome::Decided { wrote_target: false, .. })
        ));
        assert!(f.repo.commands(1, 10).await.unwrap().is_empty());
        assert_eq!(f.store.target_temp(), 21.0);
    }

    #[tokio::test]
    async fn test_offline_zone_is_skipped_without_reading() {
        let f = fixture(18.0, 21.0);
        f.link.set_online(false);
        let report = f.control.run_cycle(at(8)).await;
        assert!(matches!(report.outcome(1), Some(ZoneOutcome::Skipped { .. })));
        assert_eq!(report.unsettled(), 1);
        assert!(f.repo.latest_reading(1).await.unwrap().is_none());

        f.link.set_online(true);
        let report = f.control.run_cycle(at(9)).await;
        assert_eq!(report.unsettled(), 0);
    }

    #[tokio::test]
    async fn test_weather_adjusts_and_feeds_simulators() {
        let f = fixture(21.0, 21.0);
        let outdoor = OutdoorInput::new();
        let control = f
            .control
            .with_weather(LiveWeather {
                source: Arc::new(StaticWeatherSource::new(Some(-5.0))),
                location: GeoLocation {
                    latitude: 52.5,
                    longitude: 13.4,
                    name: None,
                },
            })
            .with_outdoor_input(outdoor.clone());

        let report = control.run_cycle(at(8)).await;
        assert_eq!(outdoor.get(), Some(-5.0));
        assert_eq!(report.weather.map(|w| w.outdoor_temp_c), Some(-5.0));
        match report.outcome(1) {
            Some(ZoneOutcome::Decided { decision, .. }) => assert_eq!(decision.target_temp, 22.0),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_weather_failure_degrades() {
        let f = fixture(21.0, 21.0);
        let control = f.control.with_weather(LiveWeather {
            source: Arc::new(StaticWeatherSource::new(None)),
            location: GeoLocation {
                latitude: 0.0,
                longitude: 0.0,
                name: None,
            },
        });
        let report = control.run_cycle(at(8)).await;
        assert!(report.weather.is_none());
        assert_eq!(report.unsettled(), 0);
    }

    #[tokio::test]
    async fn test_stored_preferences_take_precedence() {
        let f = fixture(21.0, 21.0);
        let mut custom = prefs();
        custom.schedule.clear();
        custom.default_occupied_temp = 23.0;
        f.repo.put_preferences(1, custom).await.unwrap();

        let report = f.control.run_cycle(at(8)).await;
        match report.outcome(1) {
            Some(ZoneOutcome::Decided { decision, .. }) => assert_eq!(decision.target_temp, 23.0),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_preferences_fail_zone() {
        let f = fixture(21.0, 21.0);
        let mut broken = prefs();
        broken.min_target_temp = 30.0;
        f.repo.put_preferences(1, broken).await.unwrap();

        let report = f.control.run_cycle(at(8)).await;
        assert!(matches!(report.outcome(1), Some(ZoneOutcome::Failed { .. })));
        assert_eq!(f.store.target_temp(), 21.0);
    }
}
