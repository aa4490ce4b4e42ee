/// Entity schema descriptor
///
/// The six entity kinds of the VTC data store, their foreign-key edges, and
/// the typed record variants exchanged with the data-access layer. Only the
/// identifier and foreign-key columns are declared; every other column is
/// carried verbatim in `fields`.

use std::fmt;
use std::str::FromStr;

use serde::de;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Services,
    Users,
    Vehicles,
    Drivers,
    Bookings,
    Payments,
}

/// Parents before children. Snapshots are always written in this order.
pub const INSERT_ORDER: [EntityKind; 6] = [
    EntityKind::Services,
    EntityKind::Users,
    EntityKind::Vehicles,
    EntityKind::Drivers,
    EntityKind::Bookings,
    EntityKind::Payments,
];

/// Children before parents. Services and users carry no edges between them,
/// so their relative order is free; services go first.
pub const DELETE_ORDER: [EntityKind; 6] = [
    EntityKind::Payments,
    EntityKind::Bookings,
    EntityKind::Drivers,
    EntityKind::Vehicles,
    EntityKind::Services,
    EntityKind::Users,
];

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Services => "services",
            EntityKind::Users => "users",
            EntityKind::Vehicles => "vehicles",
            EntityKind::Drivers => "drivers",
            EntityKind::Bookings => "bookings",
            EntityKind::Payments => "payments",
        }
    }

    /// Kinds this kind holds foreign keys to
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Services | EntityKind::Users | EntityKind::Vehicles => &[],
            EntityKind::Drivers => &[EntityKind::Users, EntityKind::Vehicles],
            EntityKind::Bookings => &[EntityKind::Users, EntityKind::Drivers, EntityKind::Vehicles],
            EntityKind::Payments => &[EntityKind::Bookings, EntityKind::Users],
        }
    }

    /// Kinds holding foreign keys to this kind
    pub fn dependents(&self) -> Vec<EntityKind> {
        INSERT_ORDER
            .iter()
            .copied()
            .filter(|k| k.dependencies().contains(self))
            .collect()
    }

    pub fn names() -> Vec<String> {
        INSERT_ORDER.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        INSERT_ORDER
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverRecord {
    pub id: String,
    pub user_id: String,
    pub vehicle_id: Option<String>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub id: String,
    pub user_id: String,
    pub driver_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub id: String,
    pub booking_id: String,
    pub user_id: String,
    pub fields: Map<String, Value>,
}

fn required_key<E: de::Error>(columns: &mut Map<String, Value>, key: &'static str) -> Result<String, E> {
    match columns.remove(key) {
        Some(Value::String(id)) => Ok(id),
        Some(other) => Err(E::custom(format!("{} must be a string, got {}", key, other))),
        None => Err(E::missing_field(key)),
    }
}

fn optional_key<E: de::Error>(columns: &mut Map<String, Value>, key: &'static str) -> Result<Option<String>, E> {
    match columns.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(other) => Err(E::custom(format!("{} must be a string or null, got {}", key, other))),
    }
}

// Columns are read through a plain map. `#[serde(flatten)]` buffers values and
// drops arbitrary-precision numbers.
macro_rules! record_columns {
    ($record:ident { $($key:literal => $field:ident: $take:ident),* }) => {
        impl Serialize for $record {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("id", &self.id)?;
                $(map.serialize_entry($key, &self.$field)?;)*
                for (key, value) in &self.fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }

        impl<'de> Deserialize<'de> for $record {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let mut fields = Map::<String, Value>::deserialize(deserializer)?;
                Ok(Self {
                    id: required_key::<D::Error>(&mut fields, "id")?,
                    $($field: $take::<D::Error>(&mut fields, $key)?,)*
                    fields,
                })
            }
        }
    };
}

record_columns!(ServiceRecord {});
record_columns!(UserRecord {});
record_columns!(VehicleRecord {});
record_columns!(DriverRecord {
    "userId" => user_id: required_key,
    "vehicleId" => vehicle_id: optional_key
});
record_columns!(BookingRecord {
    "userId" => user_id: required_key,
    "driverId" => driver_id: optional_key,
    "vehicleId" => vehicle_id: optional_key
});
record_columns!(PaymentRecord {
    "bookingId" => booking_id: required_key,
    "userId" => user_id: required_key
});

/// One row of any entity kind
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Service(ServiceRecord),
    User(UserRecord),
    Vehicle(VehicleRecord),
    Driver(DriverRecord),
    Booking(BookingRecord),
    Payment(PaymentRecord),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Service(_) => EntityKind::Services,
            EntityRecord::User(_) => EntityKind::Users,
            EntityRecord::Vehicle(_) => EntityKind::Vehicles,
            EntityRecord::Driver(_) => EntityKind::Drivers,
            EntityRecord::Booking(_) => EntityKind::Bookings,
            EntityRecord::Payment(_) => EntityKind::Payments,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRecord::Service(r) => &r.id,
            EntityRecord::User(r) => &r.id,
            EntityRecord::Vehicle(r) => &r.id,
            EntityRecord::Driver(r) => &r.id,
            EntityRecord::Booking(r) => &r.id,
            EntityRecord::Payment(r) => &r.id,
        }
    }

    /// Foreign keys held by this record, as (parent kind, parent id)
    pub fn references(&self) -> Vec<(EntityKind, &str)> {
        match self {
            EntityRecord::Service(_) | EntityRecord::User(_) | EntityRecord::Vehicle(_) => Vec::new(),
            EntityRecord::Driver(r) => {
                let mut refs = vec![(EntityKind::Users, r.user_id.as_str())];
                if let Some(v) = &r.vehicle_id {
                    refs.push((EntityKind::Vehicles, v.as_str()));
                }
                refs
            }
            EntityRecord::Booking(r) => {
                let mut refs = vec![(EntityKind::Users, r.user_id.as_str())];
                if let Some(d) = &r.driver_id {
                    refs.push((EntityKind::Drivers, d.as_str()));
                }
                if let Some(v) = &r.vehicle_id {
                    refs.push((EntityKind::Vehicles, v.as_str()));
                }
                refs
            }
            EntityRecord::Payment(r) => vec![
                (EntityKind::Bookings, r.booking_id.as_str()),
                (EntityKind::Users, r.user_id.as_str()),
            ],
        }
    }

    /// Parse a raw row handed over by the data-access layer
    pub fn from_value(kind: EntityKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EntityKind::Services => EntityRecord::Service(serde_json::from_value(value)?),
            EntityKind::Users => EntityRecord::User(serde_json::from_value(value)?),
            EntityKind::Vehicles => EntityRecord::Vehicle(serde_json::from_value(value)?),
            EntityKind::Drivers => EntityRecord::Driver(serde_json::from_value(value)?),
            EntityKind::Bookings => EntityRecord::Booking(serde_json::from_value(value)?),
            EntityKind::Payments => EntityRecord::Payment(serde_json::from_value(value)?),
        })
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            EntityRecord::Service(r) => serde_json::to_value(r),
            EntityRecord::User(r) => serde_json::to_value(r),
            EntityRecord::Vehicle(r) => serde_json::to_value(r),
            EntityRecord::Driver(r) => serde_json::to_value(r),
            EntityRecord::Booking(r) => serde_json::to_value(r),
            EntityRecord::Payment(r) => serde_json::to_value(r),
        }
    }
}

/// Full contents of the store, one sequence per kind.
///
/// Field order is the insert order, so serializing this struct always emits
/// kinds parents-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySet {
    pub services: Vec<ServiceRecord>,
    pub users: Vec<UserRecord>,
    pub vehicles: Vec<VehicleRecord>,
    pub drivers: Vec<DriverRecord>,
    pub bookings: Vec<BookingRecord>,
    pub payments: Vec<PaymentRecord>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the sequence of its own kind
    pub fn push(&mut self, record: EntityRecord) {
        match record {
            EntityRecord::Service(r) => self.services.push(r),
            EntityRecord::User(r) => self.users.push(r),
            EntityRecord::Vehicle(r) => self.vehicles.push(r),
            EntityRecord::Driver(r) => self.drivers.push(r),
            EntityRecord::Booking(r) => self.bookings.push(r),
            EntityRecord::Payment(r) => self.payments.push(r),
        }
    }

    pub fn len_of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Services => self.services.len(),
            EntityKind::Users => self.users.len(),
            EntityKind::Vehicles => self.vehicles.len(),
            EntityKind::Drivers => self.drivers.len(),
            EntityKind::Bookings => self.bookings.len(),
            EntityKind::Payments => self.payments.len(),
        }
    }

    pub fn total(&self) -> usize {
        INSERT_ORDER.iter().map(|k| self.len_of(*k)).sum()
    }

    /// Records of one kind, wrapped in their tagged variant
    pub fn records(&self, kind: EntityKind) -> Vec<EntityRecord> {
        match kind {
            EntityKind::Services => self.services.iter().cloned().map(EntityRecord::Service).collect(),
            EntityKind::Users => self.users.iter().cloned().map(EntityRecord::User).collect(),
            EntityKind::Vehicles => self.vehicles.iter().cloned().map(EntityRecord::Vehicle).collect(),
            EntityKind::Drivers => self.drivers.iter().cloned().map(EntityRecord::Driver).collect(),
            EntityKind::Bookings => self.bookings.iter().cloned().map(EntityRecord::Booking).collect(),
            EntityKind::Payments => self.payments.iter().cloned().map(EntityRecord::Payment).collect(),
        }
    }
}
