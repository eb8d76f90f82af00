use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub address: String,
    pub region: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub hotel_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub maxcount: i64,
    pub beds: i64,
    pub baths: i64,
    pub phonenumber: Option<String>,
    pub rentperday: i64,
    pub description: Option<String>,
    pub availability_status: RoomStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Maintenance,
    Busy,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::Busy => "busy",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "maintenance" => RoomStatus::Maintenance,
            "busy" => RoomStatus::Busy,
            _ => RoomStatus::Available,
        }
    }
}
