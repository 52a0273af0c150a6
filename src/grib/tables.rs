use serde::Serialize;

use crate::grib::sections::sect1::ProductDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelDescriptor {
    pub name: String,
    pub description: String,
    pub unit: String,
    /// Level value decoded from the two PDS level octets, when the type has one
    pub value: Option<f64>,
}

/// Human readable names for PDS codes. No tables ship with this crate.
pub trait ParameterTable {
    fn lookup_parameter(
        &self,
        center_id: u8,
        subcenter_id: u8,
        table_version: u8,
        param_id: u8,
    ) -> Option<Parameter>;

    /// `octet10` and `octet11` are the two level octets following the level type.
    fn lookup_level(&self, level_id: u8, octet10: u8, octet11: u8) -> Option<LevelDescriptor>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub parameter: Option<Parameter>,
    pub level: Option<LevelDescriptor>,
}

impl ProductDefinition {
    pub fn describe<T: ParameterTable + ?Sized>(&self, table: &T) -> Description {
        Description {
            parameter: table.lookup_parameter(
                self.centre_id,
                self.subcentre_id,
                self.table_version,
                self.parameter_id,
            ),
            level: table.lookup_level(self.level_type, self.level[0], self.level[1]),
        }
    }
}
