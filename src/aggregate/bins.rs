use serde::Serialize;

/// Ride duration buckets, lower bound inclusive.
///
/// | Range (min)  | Bin        |
/// |--------------|------------|
/// | < 5          | `<5 min`   |
/// | 5 .. 10      | `5-10 min` |
/// | 10 .. 20     | `10-20 min`|
/// | 20 .. 30     | `20-30 min`|
/// | >= 30        | `>30 min`  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DurationBin {
    Under5,
    From5To10,
    From10To20,
    From20To30,
    Over30,
}

impl DurationBin {
    pub const ALL: [DurationBin; 5] = [
        DurationBin::Under5,
        DurationBin::From5To10,
        DurationBin::From10To20,
        DurationBin::From20To30,
        DurationBin::Over30,
    ];

    pub fn classify(minutes: f64) -> Self {
        match minutes {
            m if m < 5.0 => DurationBin::Under5,
            m if m < 10.0 => DurationBin::From5To10,
            m if m < 20.0 => DurationBin::From10To20,
            m if m < 30.0 => DurationBin::From20To30,
            _ => DurationBin::Over30,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            DurationBin::Under5 => "<5 min",
            DurationBin::From5To10 => "5-10 min",
            DurationBin::From10To20 => "10-20 min",
            DurationBin::From20To30 => "20-30 min",
            DurationBin::Over30 => ">30 min",
        }
    }
}
