use serde::{Serialize, Serializer};

/// `FaixaAtraso`: days-overdue ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DelayBand {
    UpTo20,
    Days21To30,
    Days31To60,
    Days61To90,
    Days91To180,
    Days181To360,
    Over360,
}

/// Inclusive upper bounds, checked in ascending order. Anything above the
/// last bound lands in `DelayBand::Over360`.
const DELAY_THRESHOLDS: [(i64, DelayBand); 6] = [
    (20, DelayBand::UpTo20),
    (30, DelayBand::Days21To30),
    (60, DelayBand::Days31To60),
    (90, DelayBand::Days61To90),
    (180, DelayBand::Days91To180),
    (360, DelayBand::Days181To360),
];

impl DelayBand {
    pub const ALL: [DelayBand; 7] = [
        DelayBand::UpTo20,
        DelayBand::Days21To30,
        DelayBand::Days31To60,
        DelayBand::Days61To90,
        DelayBand::Days91To180,
        DelayBand::Days181To360,
        DelayBand::Over360,
    ];

    /// Negative counts are treated as zero days.
    pub fn for_days(days: i64) -> Self {
        let days = days.max(0);
        DELAY_THRESHOLDS
            .iter()
            .find(|(upper, _)| days <= *upper)
            .map(|(_, band)| *band)
            .unwrap_or(DelayBand::Over360)
    }

    pub fn label(self) -> &'static str {
        match self {
            DelayBand::UpTo20 => "0-20 dias",
            DelayBand::Days21To30 => "21-30 dias",
            DelayBand::Days31To60 => "31-60 dias",
            DelayBand::Days61To90 => "61-90 dias",
            DelayBand::Days91To180 => "91-180 dias",
            DelayBand::Days181To360 => "181-360 dias",
            DelayBand::Over360 => "Maior que 360 dias",
        }
    }
}

/// `FaixaValor`: paid-amount ranges. Labels carry an ordinal prefix so a
/// plain string sort matches the numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueBand {
    UpTo1000,
    UpTo1500,
    UpTo2000,
    UpTo3000,
    UpTo5000,
    UpTo10000,
    Over10000,
}

const VALUE_THRESHOLDS: [(f64, ValueBand); 6] = [
    (1_000.0, ValueBand::UpTo1000),
    (1_500.0, ValueBand::UpTo1500),
    (2_000.0, ValueBand::UpTo2000),
    (3_000.0, ValueBand::UpTo3000),
    (5_000.0, ValueBand::UpTo5000),
    (10_000.0, ValueBand::UpTo10000),
];

impl ValueBand {
    #[cfg(test)]
    pub const ALL: [ValueBand; 7] = [
        ValueBand::UpTo1000,
        ValueBand::UpTo1500,
        ValueBand::UpTo2000,
        ValueBand::UpTo3000,
        ValueBand::UpTo5000,
        ValueBand::UpTo10000,
        ValueBand::Over10000,
    ];

    pub fn for_amount(amount: f64) -> Self {
        VALUE_THRESHOLDS
            .iter()
            .find(|(upper, _)| amount <= *upper)
            .map(|(_, band)| *band)
            .unwrap_or(ValueBand::Over10000)
    }

    pub fn label(self) -> &'static str {
        match self {
            ValueBand::UpTo1000 => "1. Até R$ 1.000",
            ValueBand::UpTo1500 => "2. R$ 1.001 a R$ 1.500",
            ValueBand::UpTo2000 => "3. R$ 1.501 a R$ 2.000",
            ValueBand::UpTo3000 => "4. R$ 2.001 a R$ 3.000",
            ValueBand::UpTo5000 => "5. R$ 3.001 a R$ 5.000",
            ValueBand::UpTo10000 => "6. R$ 5.001 a R$ 10.000",
            ValueBand::Over10000 => "7. Maior que R$ 10.000",
        }
    }
}

impl Serialize for DelayBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl Serialize for ValueBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_bands_use_inclusive_upper_bounds() {
        let cases = [
            (0, "0-20 dias"),
            (20, "0-20 dias"),
            (21, "21-30 dias"),
            (30, "21-30 dias"),
            (31, "31-60 dias"),
            (45, "31-60 dias"),
            (60, "31-60 dias"),
            (61, "61-90 dias"),
            (90, "61-90 dias"),
            (91, "91-180 dias"),
            (180, "91-180 dias"),
            (181, "181-360 dias"),
            (360, "181-360 dias"),
            (361, "Maior que 360 dias"),
            (5_000, "Maior que 360 dias"),
        ];

        for (days, expected) in cases {
            assert_eq!(DelayBand::for_days(days).label(), expected, "days = {days}");
        }
    }

    #[test]
    fn negative_days_fall_in_first_band() {
        assert_eq!(DelayBand::for_days(-5), DelayBand::UpTo20);
        assert_eq!(DelayBand::for_days(i64::MIN), DelayBand::UpTo20);
    }

    #[test]
    fn value_bands_use_inclusive_upper_bounds() {
        let cases = [
            (0.01, ValueBand::UpTo1000),
            (1_000.0, ValueBand::UpTo1000),
            (1_000.01, ValueBand::UpTo1500),
            (1_500.0, ValueBand::UpTo1500),
            (2_000.0, ValueBand::UpTo2000),
            (2_500.0, ValueBand::UpTo3000),
            (5_000.0, ValueBand::UpTo5000),
            (10_000.0, ValueBand::UpTo10000),
            (10_000.5, ValueBand::Over10000),
        ];

        for (amount, expected) in cases {
            assert_eq!(ValueBand::for_amount(amount), expected, "amount = {amount}");
        }
    }

    #[test]
    fn value_labels_sort_in_band_order() {
        let mut labels: Vec<&str> = ValueBand::ALL.iter().rev().map(|band| band.label()).collect();
        labels.sort();
        let expected: Vec<&str> = ValueBand::ALL.iter().map(|band| band.label()).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn every_delay_label_is_distinct() {
        let mut labels: Vec<&str> = DelayBand::ALL.iter().map(|band| band.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 7);
    }

    #[test]
    fn bands_serialize_as_labels() {
        let json = serde_json::to_string(&(DelayBand::Over360, ValueBand::UpTo2000)).unwrap();
        assert_eq!(json, r#"["Maior que 360 dias","3. R$ 1.501 a R$ 2.000"]"#);
    }
}
