use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    OneWay,
    RoundTrip,
    MultiCity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Flight,
    Train,
    Bus,
    Cab,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripLeg {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDetails {
    pub trip_type: TripType,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub legs: Vec<TripLeg>,
    pub mode: TravelMode,
    pub travel_class: TravelClass,
    pub purpose: String,
    #[serde(default)]
    pub accommodation_required: bool,
    #[serde(default)]
    pub accommodation_notes: Option<String>,
    #[serde(default)]
    pub estimated_cost: Option<Decimal>,
}

impl TripDetails {
    /// A one-way trip with the remaining fields at their most common values.
    pub fn one_way(
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: NaiveDate,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            trip_type: TripType::OneWay,
            origin: origin.into(),
            destination: destination.into(),
            departure_date,
            return_date: None,
            legs: Vec::new(),
            mode: TravelMode::Flight,
            travel_class: TravelClass::Economy,
            purpose: purpose.into(),
            accommodation_required: false,
            accommodation_notes: None,
            estimated_cost: None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("trip_details.origin", &self.origin)?;
        require_text("trip_details.destination", &self.destination)?;
        require_text("trip_details.purpose", &self.purpose)?;

        if self.origin.trim().eq_ignore_ascii_case(self.destination.trim()) {
            return Err(DomainError::Validation(
                "trip_details.origin and trip_details.destination must differ".to_owned(),
            ));
        }

        match self.trip_type {
            TripType::OneWay => {}
            TripType::RoundTrip => {
                let Some(return_date) = self.return_date else {
                    return Err(DomainError::Validation(
                        "trip_details.return_date is required for round trips".to_owned(),
                    ));
                };
                if return_date < self.departure_date {
                    return Err(DomainError::Validation(
                        "trip_details.return_date must not precede departure_date".to_owned(),
                    ));
                }
            }
            TripType::MultiCity => {
                if self.legs.len() < 2 {
                    return Err(DomainError::Validation(
                        "trip_details.legs must contain at least two legs for multi-city trips"
                            .to_owned(),
                    ));
                }
                let mut previous = self.departure_date;
                for (index, leg) in self.legs.iter().enumerate() {
                    require_text(&format!("trip_details.legs[{index}].origin"), &leg.origin)?;
                    require_text(
                        &format!("trip_details.legs[{index}].destination"),
                        &leg.destination,
                    )?;
                    if leg.date < previous {
                        return Err(DomainError::Validation(format!(
                            "trip_details.legs[{index}].date must not precede the previous leg"
                        )));
                    }
                    previous = leg.date;
                }
            }
        }

        if let Some(cost) = self.estimated_cost {
            if cost.is_sign_negative() {
                return Err(DomainError::Validation(
                    "trip_details.estimated_cost must not be negative".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Partial update of [`TripDetails`] applied by a POC during the edit window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDetailsPatch {
    #[serde(default)]
    pub trip_type: Option<TripType>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub legs: Option<Vec<TripLeg>>,
    #[serde(default)]
    pub mode: Option<TravelMode>,
    #[serde(default)]
    pub travel_class: Option<TravelClass>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub accommodation_required: Option<bool>,
    #[serde(default)]
    pub accommodation_notes: Option<String>,
    #[serde(default)]
    pub estimated_cost: Option<Decimal>,
}

impl TripDetailsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the patched details and the names of the fields whose value changed.
    pub fn apply_to(
        &self,
        current: &TripDetails,
    ) -> Result<(TripDetails, Vec<&'static str>), DomainError> {
        if self.is_empty() {
            return Err(DomainError::Validation("trip details patch is empty".to_owned()));
        }

        let mut next = current.clone();
        let mut changed = Vec::new();

        patch_field(&mut next.trip_type, &self.trip_type, "trip_type", &mut changed);
        patch_field(&mut next.origin, &self.origin, "origin", &mut changed);
        patch_field(&mut next.destination, &self.destination, "destination", &mut changed);
        patch_field(&mut next.departure_date, &self.departure_date, "departure_date", &mut changed);
        if let Some(return_date) = self.return_date {
            if next.return_date != Some(return_date) {
                next.return_date = Some(return_date);
                changed.push("return_date");
            }
        }
        patch_field(&mut next.legs, &self.legs, "legs", &mut changed);
        patch_field(&mut next.mode, &self.mode, "mode", &mut changed);
        patch_field(&mut next.travel_class, &self.travel_class, "travel_class", &mut changed);
        patch_field(&mut next.purpose, &self.purpose, "purpose", &mut changed);
        patch_field(
            &mut next.accommodation_required,
            &self.accommodation_required,
            "accommodation_required",
            &mut changed,
        );
        if let Some(notes) = &self.accommodation_notes {
            if next.accommodation_notes.as_ref() != Some(notes) {
                next.accommodation_notes = Some(notes.clone());
                changed.push("accommodation_notes");
            }
        }
        if let Some(cost) = self.estimated_cost {
            if next.estimated_cost != Some(cost) {
                next.estimated_cost = Some(cost);
                changed.push("estimated_cost");
            }
        }

        if changed.is_empty() {
            return Err(DomainError::Validation(
                "trip details patch does not change any field".to_owned(),
            ));
        }

        next.validate()?;
        Ok((next, changed))
    }
}

fn patch_field<T>(
    target: &mut T,
    value: &Option<T>,
    name: &'static str,
    changed: &mut Vec<&'static str>,
) where
    T: Clone + PartialEq,
{
    if let Some(value) = value {
        if target != value {
            *target = value.clone();
            changed.push(name);
        }
    }
}
