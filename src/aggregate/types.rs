//! Data types of the finalized statistics snapshot.

use chrono::NaiveDate;
use serde::Serialize;

use crate::stations::StationResolver;

/// Visits (departures + arrivals) at one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationVisits {
    pub station_id: String,
    pub name: Option<String>,
    pub visits: usize,
}

/// A ride in a top-N ranking. `value` is minutes for the longest-ride list
/// and km/h for the fastest-ride list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRide {
    pub departure_station_id: Option<String>,
    pub departure_name: Option<String>,
    pub arrival_station_id: Option<String>,
    pub arrival_name: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BikeUsage {
    pub bike_id: String,
    pub rides: usize,
}

/// Electric/mechanical split. Bike counts are over distinct numeric ids,
/// trip counts over rides with a numeric bike id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BikeSplit {
    pub electric_bikes: usize,
    pub mechanical_bikes: usize,
    pub electric_trips: usize,
    pub mechanical_trips: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BonusStats {
    pub total: f64,
    pub trips: usize,
    pub trips_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Averages {
    pub duration_minutes: f64,
    pub speed_kmh: f64,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationBinCount {
    pub label: &'static str,
    pub rides: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourCount {
    pub hour: u32,
    pub rides: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub rides: usize,
}

/// Aggregate metrics for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub rides_counted: usize,
    pub negative_durations: usize,
    pub total_bikes: usize,
    pub boomerang_trips: usize,
    pub distance_total_meters: f64,
    pub bonus: BonusStats,
    pub averages: Averages,
    pub bikes: BikeSplit,
    pub top_stations: Vec<StationVisits>,
    pub longest_rides: Vec<RankedRide>,
    pub fastest_rides: Vec<RankedRide>,
    pub top_bikes: Vec<BikeUsage>,
    pub duration_bins: Vec<DurationBinCount>,
    pub hourly: Vec<HourCount>,
    pub daily: Vec<DayCount>,
}

impl StatisticsSnapshot {
    /// Fills display names on every station reference, falling back to a
    /// synthesized label for unknown stations.
    pub fn label_stations(&mut self, resolver: &impl StationResolver) {
        for station in &mut self.top_stations {
            station.name = Some(resolver.display_name(&station.station_id));
        }

        for ride in self
            .longest_rides
            .iter_mut()
            .chain(self.fastest_rides.iter_mut())
        {
            ride.departure_name = ride
                .departure_station_id
                .as_deref()
                .map(|id| resolver.display_name(id));
            ride.arrival_name = ride
                .arrival_station_id
                .as_deref()
                .map(|id| resolver.display_name(id));
        }
    }
}
