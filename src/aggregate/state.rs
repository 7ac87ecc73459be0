use chrono::{NaiveDate, Timelike};
use std::collections::BTreeMap;
use tracing::debug;

use crate::aggregate::bins::DurationBin;
use crate::aggregate::counter::OrderedCounter;
use crate::aggregate::types::{
    Averages, BikeSplit, BikeUsage, BonusStats, DayCount, DurationBinCount, HourCount, RankedRide,
    StationVisits, StatisticsSnapshot,
};
use crate::aggregate::utility::{mean, pct};
use crate::ride::{RejectReason, Ride};

/// What to do with a ride whose end time precedes its start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeDurationPolicy {
    #[default]
    Reject,
    ClampToZero,
}

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    pub top_n: usize,
    /// Numeric bike ids below this are electric, the rest mechanical.
    pub electric_threshold: i64,
    pub boomerang_seconds: i64,
    pub negative_duration: NegativeDurationPolicy,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            electric_threshold: 50_000,
            boomerang_seconds: 60,
            negative_duration: NegativeDurationPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone)]
struct Sample {
    value: f64,
    departure: Option<String>,
    arrival: Option<String>,
}

/// Running aggregation over ingested rides.
///
/// Sums, totals and bin membership do not depend on ingestion order. Top-N
/// tie-breaks do: equal values keep the order in which they were ingested
/// (for stations and bikes, the order each id was first seen).
#[derive(Debug, Clone)]
pub struct AggregationState {
    config: AggregationConfig,
    rides_counted: usize,
    negative_durations: usize,
    stations: OrderedCounter,
    bikes: OrderedCounter,
    durations: Vec<Sample>,
    speeds: Vec<Sample>,
    electric_trips: usize,
    mechanical_trips: usize,
    boomerang_trips: usize,
    bonus_total: f64,
    bonus_trips: usize,
    distance_total: f64,
    hours: [usize; 24],
    days: BTreeMap<NaiveDate, usize>,
}

impl Default for AggregationState {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}

impl AggregationState {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            rides_counted: 0,
            negative_durations: 0,
            stations: OrderedCounter::default(),
            bikes: OrderedCounter::default(),
            durations: Vec::new(),
            speeds: Vec::new(),
            electric_trips: 0,
            mechanical_trips: 0,
            boomerang_trips: 0,
            bonus_total: 0.0,
            bonus_trips: 0,
            distance_total: 0.0,
            hours: [0; 24],
            days: BTreeMap::new(),
        }
    }

    pub fn rides_counted(&self) -> usize {
        self.rides_counted
    }

    /// Folds one ride into the running state.
    ///
    /// Under [`NegativeDurationPolicy::Reject`] a ride ending before it
    /// starts is refused and leaves every aggregate untouched except the
    /// negative-duration counter.
    pub fn ingest(&mut self, ride: &Ride) -> Result<(), RejectReason> {
        let mut duration = ride.duration_seconds();
        if duration < 0 {
            self.negative_durations += 1;
            match self.config.negative_duration {
                NegativeDurationPolicy::Reject => {
                    return Err(RejectReason::NegativeDuration(duration));
                }
                NegativeDurationPolicy::ClampToZero => {
                    debug!(duration, "Clamping negative ride duration to zero");
                    duration = 0;
                }
            }
        }

        self.rides_counted += 1;

        if let Some(id) = &ride.departure_station_id {
            self.stations.increment(id);
        }
        if let Some(id) = &ride.arrival_station_id {
            self.stations.increment(id);
        }

        self.durations.push(Sample {
            value: duration as f64,
            departure: ride.departure_station_id.clone(),
            arrival: ride.arrival_station_id.clone(),
        });
        if let Some(speed) = ride.average_speed_kmh {
            self.speeds.push(Sample {
                value: speed,
                departure: ride.departure_station_id.clone(),
                arrival: ride.arrival_station_id.clone(),
            });
        }

        if let Some(bike) = &ride.bike_id {
            self.bikes.increment(bike);
            match self.is_electric(bike) {
                Some(true) => self.electric_trips += 1,
                Some(false) => self.mechanical_trips += 1,
                None => {}
            }
        }

        if duration < self.config.boomerang_seconds {
            self.boomerang_trips += 1;
        }

        self.bonus_total += ride.bonus_earned;
        if ride.bonus_earned > 0.0 {
            self.bonus_trips += 1;
        }
        self.distance_total += ride.distance_meters;

        self.hours[ride.start_time.hour() as usize] += 1;
        *self.days.entry(ride.start_time.date_naive()).or_default() += 1;

        Ok(())
    }

    /// Adds another partial state into this one. Samples and first-seen
    /// orders of `other` are placed after those of `self`, so merging states
    /// built from consecutive chunks of a ride sequence is the same as
    /// ingesting the whole sequence.
    pub fn merge(&mut self, other: AggregationState) {
        self.rides_counted += other.rides_counted;
        self.negative_durations += other.negative_durations;
        self.stations.merge(&other.stations);
        self.bikes.merge(&other.bikes);
        self.durations.extend(other.durations);
        self.speeds.extend(other.speeds);
        self.electric_trips += other.electric_trips;
        self.mechanical_trips += other.mechanical_trips;
        self.boomerang_trips += other.boomerang_trips;
        self.bonus_total += other.bonus_total;
        self.bonus_trips += other.bonus_trips;
        self.distance_total += other.distance_total;
        for (mine, theirs) in self.hours.iter_mut().zip(other.hours) {
            *mine += theirs;
        }
        for (day, n) in other.days {
            *self.days.entry(day).or_default() += n;
        }
    }

    /// Produces the snapshot. Does not consume or alter the state, so
    /// calling it again without further ingestion yields an equal snapshot.
    pub fn finalize(&self) -> StatisticsSnapshot {
        let top_n = self.config.top_n;

        let top_stations = self
            .stations
            .most_common(top_n)
            .into_iter()
            .map(|(station_id, visits)| StationVisits {
                station_id,
                name: None,
                visits,
            })
            .collect();

        let longest_rides = ranked(&self.durations, top_n, |secs| secs / 60.0);
        let fastest_rides = ranked(&self.speeds, top_n, |kmh| kmh);

        let top_bikes = self
            .bikes
            .most_common(top_n)
            .into_iter()
            .map(|(bike_id, rides)| BikeUsage { bike_id, rides })
            .collect();

        let mut bin_counts = [0usize; 5];
        for sample in &self.durations {
            bin_counts[DurationBin::classify(sample.value / 60.0).index()] += 1;
        }
        let binned: usize = bin_counts.iter().sum();
        let duration_bins = DurationBin::ALL
            .iter()
            .map(|bin| DurationBinCount {
                label: bin.label(),
                rides: bin_counts[bin.index()],
                pct: pct(bin_counts[bin.index()], binned),
            })
            .collect();

        let (electric_bikes, mechanical_bikes) =
            self.bikes
                .iter()
                .fold((0, 0), |(e, m), (id, _)| match self.is_electric(id) {
                    Some(true) => (e + 1, m),
                    Some(false) => (e, m + 1),
                    None => (e, m),
                });

        let duration_values: Vec<f64> = self.durations.iter().map(|s| s.value).collect();
        let speed_values: Vec<f64> = self.speeds.iter().map(|s| s.value).collect();
        let distance_km = if self.rides_counted == 0 {
            0.0
        } else {
            self.distance_total / self.rides_counted as f64 / 1000.0
        };

        StatisticsSnapshot {
            rides_counted: self.rides_counted,
            negative_durations: self.negative_durations,
            total_bikes: self.bikes.len(),
            boomerang_trips: self.boomerang_trips,
            distance_total_meters: self.distance_total,
            bonus: BonusStats {
                total: self.bonus_total,
                trips: self.bonus_trips,
                trips_pct: pct(self.bonus_trips, self.rides_counted),
            },
            averages: Averages {
                duration_minutes: mean(&duration_values) / 60.0,
                speed_kmh: mean(&speed_values),
                distance_km,
            },
            bikes: BikeSplit {
                electric_bikes,
                mechanical_bikes,
                electric_trips: self.electric_trips,
                mechanical_trips: self.mechanical_trips,
            },
            top_stations,
            longest_rides,
            fastest_rides,
            top_bikes,
            duration_bins,
            hourly: self
                .hours
                .iter()
                .enumerate()
                .map(|(hour, &rides)| HourCount {
                    hour: hour as u32,
                    rides,
                })
                .collect(),
            daily: self
                .days
                .iter()
                .map(|(&date, &rides)| DayCount { date, rides })
                .collect(),
        }
    }

    fn is_electric(&self, bike_id: &str) -> Option<bool> {
        bike_id
            .parse::<i64>()
            .ok()
            .map(|n| n < self.config.electric_threshold)
    }
}

fn ranked(samples: &[Sample], top_n: usize, scale: impl Fn(f64) -> f64) -> Vec<RankedRide> {
    let mut order: Vec<&Sample> = samples.iter().collect();
    // stable: equal values stay in ingestion order
    order.sort_by(|a, b| b.value.total_cmp(&a.value));
    order
        .into_iter()
        .take(top_n)
        .map(|s| RankedRide {
            departure_station_id: s.departure.clone(),
            departure_name: None,
            arrival_station_id: s.arrival.clone(),
            arrival_name: None,
            value: scale(s.value),
        })
        .collect()
}
