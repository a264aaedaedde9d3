// Alarm write endpoints.

use serde::Serialize;
use serde_json::Value;

use crate::client::DiveraClient;
use crate::error::Error;
use crate::models::{AlarmBody, CloseAlarm};

impl DiveraClient {
    /// Create a new alarm (`POST alarms`). Returns the created alarm data.
    pub async fn create_alarm(&self, alarm: &(impl Serialize + Sync)) -> Result<Value, Error> {
        let url = self.api_url("alarms")?;
        self.post(url, &AlarmBody { alarm }).await
    }

    /// Modify an existing alarm (`PUT alarms/{id}`).
    pub async fn update_alarm(
        &self,
        alarm_id: u64,
        alarm: &(impl Serialize + Sync),
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("alarms/{alarm_id}"))?;
        self.put(url, &AlarmBody { alarm }).await?;
        Ok(())
    }

    /// Close or reopen an alarm, optionally with a report text.
    pub async fn close_alarm(
        &self,
        alarm_id: u64,
        closed: bool,
        report: Option<&str>,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("alarms/close/{alarm_id}"))?;
        let body = AlarmBody {
            alarm: &CloseAlarm { closed, report },
        };
        self.post(url, &body).await?;
        Ok(())
    }
}
