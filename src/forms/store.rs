use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::payload::{FormPayload, MergeReport, VehicleClass};
use crate::backend::{DefaultDataPayload, ProvinceList};

/// Reference lists used to fill the form (province pickers, color choices)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefaultReferenceData {
    pub provinces: Vec<String>,
    pub hot_provinces: Vec<String>,
    pub vehicle_colors: Vec<String>,
    /// Scalar `default_*` values from the default-data endpoint
    pub defaults: BTreeMap<String, String>,
}

impl DefaultReferenceData {
    /// Section-wise merge: whatever the response omits is kept.
    pub fn merge_defaults(&mut self, payload: DefaultDataPayload) {
        let defaults = payload.default_values();
        if let Some(provinces) = payload.provinces {
            self.provinces = provinces;
        }
        if let Some(hot) = payload.hot_provinces {
            self.hot_provinces = hot;
        }
        if let Some(colors) = payload.vehicle_colors {
            self.vehicle_colors = colors.into_names();
        }
        self.defaults.extend(defaults);
    }

    pub fn merge_provinces(&mut self, list: ProvinceList) {
        if let Some(all) = list.all_provinces {
            self.provinces = all;
        }
        if let Some(hot) = list.hot_provinces {
            self.hot_provinces = hot;
        }
    }
}

/// Owns both application forms and the reference data loaded for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormStore {
    passenger: FormPayload,
    truck: FormPayload,
    reference: DefaultReferenceData,
}

impl Default for FormStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FormStore {
    pub fn new() -> Self {
        Self {
            passenger: FormPayload::defaults(VehicleClass::Passenger),
            truck: FormPayload::defaults(VehicleClass::Truck),
            reference: DefaultReferenceData::default(),
        }
    }

    pub fn form(&self, class: VehicleClass) -> &FormPayload {
        match class {
            VehicleClass::Passenger => &self.passenger,
            VehicleClass::Truck => &self.truck,
        }
    }

    fn form_mut(&mut self, class: VehicleClass) -> &mut FormPayload {
        match class {
            VehicleClass::Passenger => &mut self.passenger,
            VehicleClass::Truck => &mut self.truck,
        }
    }

    pub fn update_form<I, K, V>(&mut self, class: VehicleClass, partial: I) -> MergeReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let report = self.form_mut(class).merge(partial);
        if !report.ignored.is_empty() {
            warn!(
                vehicle_class = %class,
                ignored = ?report.ignored,
                "Ignoring fields outside the form schema"
            );
        }
        debug!(vehicle_class = %class, updated = ?report.updated, "Form updated");
        report
    }

    pub fn reset_form(&mut self, class: VehicleClass) {
        *self.form_mut(class) = FormPayload::defaults(class);
        debug!(vehicle_class = %class, "Form reset to defaults");
    }

    pub fn reference_data(&self) -> &DefaultReferenceData {
        &self.reference
    }

    pub fn merge_defaults(&mut self, payload: DefaultDataPayload) {
        self.reference.merge_defaults(payload);
    }

    pub fn merge_provinces(&mut self, list: ProvinceList) {
        self.reference.merge_provinces(list);
    }
}
