use crate::sen5x::SensorMeasurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorModel {
    /// Particulate matter only.
    Sen50,
    /// Particulate matter, RH/T and VOC.
    Sen54,
    /// Particulate matter, RH/T, VOC and NOx.
    Sen55,
}

impl SensorModel {
    /// Picks the variant from the product name reported by the device. Names that mention
    /// neither SEN55 nor SEN54 are treated as the particulate-only variant.
    pub fn from_product_name(name: &str) -> Self {
        let name = name.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if name.contains("SEN55") {
            SensorModel::Sen55
        } else if name.contains("SEN54") {
            SensorModel::Sen54
        } else {
            SensorModel::Sen50
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorModel::Sen50 => "SEN50",
            SensorModel::Sen54 => "SEN54",
            SensorModel::Sen55 => "SEN55",
        }
    }

    pub fn has_rht(&self) -> bool {
        matches!(self, SensorModel::Sen54 | SensorModel::Sen55)
    }

    pub fn has_voc(&self) -> bool {
        matches!(self, SensorModel::Sen54 | SensorModel::Sen55)
    }

    pub fn has_nox(&self) -> bool {
        matches!(self, SensorModel::Sen55)
    }

    /// Clears every channel this variant cannot measure.
    pub fn mask(&self, mut m: SensorMeasurement) -> SensorMeasurement {
        if !self.has_rht() {
            m.humidity = None;
            m.temperature = None;
        }
        if !self.has_voc() {
            m.voc_index = None;
        }
        if !self.has_nox() {
            m.nox_index = None;
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> SensorMeasurement {
        SensorMeasurement {
            pm1_0: Some(1),
            pm2_5: Some(2),
            pm4_0: Some(3),
            pm10_0: Some(4),
            humidity: Some(40),
            temperature: Some(22),
            voc_index: Some(100),
            nox_index: Some(1),
        }
    }

    #[test]
    fn parses_product_names_with_padding() {
        assert_eq!(SensorModel::from_product_name("SEN55\0\0\0"), SensorModel::Sen55);
        assert_eq!(SensorModel::from_product_name(" SEN54 "), SensorModel::Sen54);
        assert_eq!(SensorModel::from_product_name("SEN50"), SensorModel::Sen50);
        assert_eq!(SensorModel::from_product_name(""), SensorModel::Sen50);
    }

    #[test]
    fn sen54_has_no_nox() {
        let m = SensorModel::Sen54.mask(full());

        assert_eq!(m.voc_index, Some(100));
        assert_eq!(m.nox_index, None);
    }

    #[test]
    fn sen50_keeps_only_particulates() {
        let m = SensorModel::Sen50.mask(full());

        assert_eq!(m.pm2_5, Some(2));
        assert_eq!(m.humidity, None);
        assert_eq!(m.temperature, None);
        assert_eq!(m.voc_index, None);
        assert_eq!(m.nox_index, None);
    }

    #[test]
    fn sen55_is_untouched() {
        assert_eq!(SensorModel::Sen55.mask(full()), full());
    }
}
