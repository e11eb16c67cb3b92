use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("Invalid vehicle class: {0} (expected 'passenger' or 'truck')")]
    InvalidVehicleClass(String),
}

/// Which enrollment flow a form belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Passenger,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 2] = [VehicleClass::Passenger, VehicleClass::Truck];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleClass::Passenger => "passenger",
            VehicleClass::Truck => "truck",
        }
    }

    /// Field names accepted by this class's form, in display order
    pub fn schema(self) -> &'static [&'static str] {
        match self {
            VehicleClass::Passenger => PASSENGER_FIELDS,
            VehicleClass::Truck => TRUCK_FIELDS,
        }
    }

    fn default_value(self, field: &str) -> &'static str {
        match (self, field) {
            (VehicleClass::Truck, "vehicleColor") => "黄色",
            (VehicleClass::Truck, "usePurpose") => "货运",
            (VehicleClass::Truck, "axleCount") => "2",
            (VehicleClass::Truck, "tireCount") => "6",
            _ => "",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passenger" => Ok(VehicleClass::Passenger),
            "truck" => Ok(VehicleClass::Truck),
            _ => Err(FormError::InvalidVehicleClass(s.to_string())),
        }
    }
}

const PASSENGER_FIELDS: &[&str] = &[
    "name",
    "idCode",
    "phone",
    "bankNo",
    "bankName",
    "plateProvince",
    "plateLetter",
    "plateNumber",
    "vin",
    "vehicleColor",
];

const TRUCK_FIELDS: &[&str] = &[
    "name",
    "idCode",
    "phone",
    "bankNo",
    "bankName",
    "plateProvince",
    "plateLetter",
    "plateNumber",
    "vin",
    "loadWeight",
    "length",
    "width",
    "height",
    "vehicleColor",
    "vehicleType",
    "usePurpose",
    "axleCount",
    "tireCount",
];

/// Fields the apply endpoints reject when blank
pub const REQUIRED_FIELDS: &[&str] = &[
    "name",
    "idCode",
    "phone",
    "plateProvince",
    "plateLetter",
    "plateNumber",
    "vin",
];

/// Outcome of merging a partial update into a payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub updated: Vec<String>,
    pub ignored: Vec<String>,
}

/// One application form. Keys are fixed by the vehicle class schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormPayload {
    #[serde(skip)]
    class: VehicleClass,
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
}

impl FormPayload {
    pub fn defaults(class: VehicleClass) -> Self {
        let fields = class
            .schema()
            .iter()
            .map(|field| (field.to_string(), class.default_value(field).to_string()))
            .collect();
        Self { class, fields }
    }

    pub fn class(&self) -> VehicleClass {
        self.class
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Shallow overwrite of known keys. Unknown keys are reported, never inserted.
    pub fn merge<I, K, V>(&mut self, partial: I) -> MergeReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut report = MergeReport::default();
        for (key, value) in partial {
            let key = key.into();
            match self.fields.get_mut(&key) {
                Some(slot) => {
                    *slot = value.into();
                    report.updated.push(key);
                }
                None => report.ignored.push(key),
            }
        }
        report
    }

    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| self.get(field).map_or(true, |v| v.trim().is_empty()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vehicle_class() {
        assert_eq!("passenger".parse::<VehicleClass>(), Ok(VehicleClass::Passenger));
        assert_eq!(" Truck ".parse::<VehicleClass>(), Ok(VehicleClass::Truck));
        assert_eq!(
            "bus".parse::<VehicleClass>(),
            Err(FormError::InvalidVehicleClass("bus".to_string()))
        );
    }

    #[test]
    fn test_truck_defaults_are_not_empty() {
        let truck = FormPayload::defaults(VehicleClass::Truck);
        assert_eq!(truck.get("vehicleColor"), Some("黄色"));
        assert_eq!(truck.get("usePurpose"), Some("货运"));
        assert_eq!(truck.get("axleCount"), Some("2"));
        assert_eq!(truck.get("tireCount"), Some("6"));
        assert_eq!(truck.get("name"), Some(""));
        assert_eq!(truck.fields().len(), TRUCK_FIELDS.len());
    }

    #[test]
    fn test_passenger_defaults() {
        let passenger = FormPayload::defaults(VehicleClass::Passenger);
        assert_eq!(passenger.fields().len(), PASSENGER_FIELDS.len());
        assert!(passenger.fields().values().all(String::is_empty));
        assert_eq!(passenger.get("loadWeight"), None);
    }

    #[test]
    fn test_merge_skips_unknown_keys() {
        let mut passenger = FormPayload::defaults(VehicleClass::Passenger);
        let report = passenger.merge([("name", "张三"), ("axleCount", "3")]);

        assert_eq!(report.updated, vec!["name".to_string()]);
        assert_eq!(report.ignored, vec!["axleCount".to_string()]);
        assert_eq!(passenger.get("name"), Some("张三"));
        assert_eq!(passenger.get("axleCount"), None);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut truck = FormPayload::defaults(VehicleClass::Truck);
        truck.merge([("vin", "LSVAM4187C2184847")]);
        truck.merge([("phone", "13800000000")]);

        assert_eq!(truck.get("vin"), Some("LSVAM4187C2184847"));
        assert_eq!(truck.get("phone"), Some("13800000000"));
        assert_eq!(truck.get("vehicleColor"), Some("黄色"));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut passenger = FormPayload::defaults(VehicleClass::Passenger);
        passenger.merge([("plateProvince", "苏")]);
        let json = serde_json::to_value(&passenger).unwrap();

        assert_eq!(json["plateProvince"], "苏");
        assert_eq!(json["vin"], "");
        assert!(json.get("class").is_none());
    }

    #[test]
    fn test_missing_required_fields() {
        let mut passenger = FormPayload::defaults(VehicleClass::Passenger);
        assert_eq!(passenger.missing_required_fields().len(), REQUIRED_FIELDS.len());

        passenger.merge([
            ("name", "张三"),
            ("idCode", "110101199003077777"),
            ("phone", "13800000000"),
            ("plateProvince", "苏"),
            ("plateLetter", "Z"),
            ("plateNumber", "9T4P0"),
        ]);
        assert_eq!(passenger.missing_required_fields(), vec!["vin"]);
    }
}
