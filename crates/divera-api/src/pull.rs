// Read endpoints: the per-unit data tree and vehicle properties.

use serde_json::{Map, Value};

use crate::client::DiveraClient;
use crate::error::Error;

impl DiveraClient {
    /// Fetch the full data tree of one unit (`GET pull/all?ucr={ucr_id}`).
    ///
    /// Returns the envelope's `data` object untouched.
    pub async fn pull_all(&self, ucr_id: u64) -> Result<Value, Error> {
        let mut url = self.api_url("pull/all")?;
        url.query_pairs_mut()
            .append_pair("ucr", &ucr_id.to_string());
        let data = self.get(url).await?;
        if data.is_object() {
            Ok(data)
        } else {
            Err(Error::Deserialization {
                message: "pull/all returned no data object".into(),
                body: data.to_string(),
            })
        }
    }

    /// Fetch custom properties of one vehicle
    /// (`GET using-vehicle-property/get/{vehicle_id}`).
    ///
    /// Divera encodes an empty property set as `[]`; that maps to an empty map.
    pub async fn vehicle_properties(&self, vehicle_id: u64) -> Result<Map<String, Value>, Error> {
        let url = self.api_url(&format!("using-vehicle-property/get/{vehicle_id}"))?;
        match self.get(url).await? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}
