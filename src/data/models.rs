use diesel::sql_types::{BigInt, Bool, Double, Nullable, Text};
use serde::{Deserialize, Serialize};

pub const WGS84_SRID: i32 = 4326;
pub const LAMBERT93_SRID: i32 = 2154;

/// Spatial reference the `longitude`/`latitude` pair of an `Address` is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// EPSG:4326, what the table stores
    Wgs84,
    /// EPSG:2154, only produced by `find_malformed_addresses`
    Lambert93,
}

impl CoordinateSystem {
    pub fn srid(self) -> i32 {
        match self {
            CoordinateSystem::Wgs84 => WGS84_SRID,
            CoordinateSystem::Lambert93 => LAMBERT93_SRID,
        }
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        CoordinateSystem::Wgs84
    }
}

/// Reference to the incident report an address belongs to. Only the id is
/// known here, the report itself is persisted elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Option<i64>,
    pub text: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub coordinate_system: CoordinateSystem,
    pub location_precision: Option<String>,
    pub report: Option<ReportRef>,
    pub is_corrected: bool,
}

impl Address {
    pub fn new(text: &str, longitude: f64, latitude: f64, report_id: i64) -> Address {
        Address {
            text: Some(text.to_owned()),
            longitude,
            latitude,
            report: Some(ReportRef { id: report_id }),
            ..Address::default()
        }
    }

    /// `None` and `Some(0)` both mean the address was never inserted.
    pub fn has_id(&self) -> bool {
        matches!(self.id, Some(id) if id != 0)
    }

    pub fn report_id(&self) -> Option<i64> {
        self.report.map(|r| r.id)
    }
}

/// Row shape shared by every `SELECT` returning a full address.
#[derive(QueryableByName, Debug)]
pub struct AddressRow {
    #[sql_type = "BigInt"]
    pub id_adresse: i64,
    #[sql_type = "Nullable<Text>"]
    pub adresse: Option<String>,
    #[sql_type = "Double"]
    pub lng: f64,
    #[sql_type = "Double"]
    pub lat: f64,
    #[sql_type = "Nullable<Text>"]
    pub precision_localisation: Option<String>,
    #[sql_type = "BigInt"]
    pub fk_id_signalement: i64,
    #[sql_type = "Bool"]
    pub is_adresse_rattrapee: bool,
}

impl AddressRow {
    pub fn into_address(self, coordinate_system: CoordinateSystem) -> Address {
        Address {
            id: Some(self.id_adresse),
            text: self.adresse,
            longitude: self.lng,
            latitude: self.lat,
            coordinate_system,
            location_precision: self.precision_localisation,
            report: Some(ReportRef { id: self.fk_id_signalement }),
            is_corrected: self.is_adresse_rattrapee,
        }
    }
}

#[derive(QueryableByName, Debug)]
pub struct TextRow {
    #[sql_type = "BigInt"]
    pub id_adresse: i64,
    #[sql_type = "Nullable<Text>"]
    pub adresse: Option<String>,
}

#[derive(QueryableByName, Debug)]
pub struct PointRow {
    #[sql_type = "Double"]
    pub lng: f64,
    #[sql_type = "Double"]
    pub lat: f64,
}

#[derive(QueryableByName, Debug)]
pub struct NextId {
    #[sql_type = "BigInt"]
    pub id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_id_counts_as_unset() {
        let mut address = Address::new("1 rue de Rivoli, 75001 PARIS", 2.35, 48.85, 7);
        assert!(!address.has_id());

        address.id = Some(0);
        assert!(!address.has_id());

        address.id = Some(12);
        assert!(address.has_id());
        assert_eq!(address.report_id(), Some(7));
    }

    #[test]
    fn row_decodes_into_address_with_report_reference() {
        let row = AddressRow {
            id_adresse: 3,
            adresse: Some("2 place de l'Hôtel de Ville, 75004 PARIS".to_string()),
            lng: 2.3522,
            lat: 48.8566,
            precision_localisation: Some("ROOFTOP".to_string()),
            fk_id_signalement: 42,
            is_adresse_rattrapee: false,
        };

        let address = row.into_address(CoordinateSystem::Wgs84);
        assert_eq!(address.id, Some(3));
        assert_eq!(address.report, Some(ReportRef { id: 42 }));
        assert_eq!(address.coordinate_system.srid(), 4326);
        assert!(!address.is_corrected);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let address = Address::new("10 rue X, 75010 PARIS", 2.36, 48.87, 1);
        let json = serde_json::to_value(&address).unwrap();

        assert_eq!(json["text"], "10 rue X, 75010 PARIS");
        assert_eq!(json["coordinateSystem"], "Wgs84");
        assert_eq!(json["isCorrected"], false);
        assert_eq!(json["report"]["id"], 1);
        assert!(json.get("locationPrecision").is_some());
    }
}
