// Vehicle write endpoints: FMS status, custom properties, crew.

use serde_json::{Map, Value};

use crate::client::DiveraClient;
use crate::error::Error;
use crate::models::{CrewBody, CrewChange, CrewMode, VehicleStatusUpdate};

impl DiveraClient {
    /// Set FMS status, note and position of a vehicle.
    pub async fn set_vehicle_status(
        &self,
        vehicle_id: u64,
        update: &VehicleStatusUpdate,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("using-vehicles/set-status/{vehicle_id}"))?;
        self.post(url, update).await?;
        Ok(())
    }

    /// Overwrite individual custom properties of a vehicle.
    pub async fn set_vehicle_properties(
        &self,
        vehicle_id: u64,
        properties: &Map<String, Value>,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("using-vehicle-property/set/{vehicle_id}"))?;
        self.post(url, properties).await?;
        Ok(())
    }

    /// Add crew members to, remove them from, or reset the crew of a vehicle.
    ///
    /// `reset` sends an empty body and ignores `crew`.
    pub async fn update_vehicle_crew(
        &self,
        vehicle_id: u64,
        mode: CrewMode,
        crew: &[u64],
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("using-vehicle-crew/{mode}/{vehicle_id}"))?;
        let change = match mode {
            CrewMode::Add => Some(CrewChange {
                add: Some(crew),
                remove: None,
            }),
            CrewMode::Remove => Some(CrewChange {
                add: None,
                remove: Some(crew),
            }),
            CrewMode::Reset => None,
        };
        self.post(url, &CrewBody { crew: change }).await?;
        Ok(())
    }
}
