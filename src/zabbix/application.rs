use serde::{Deserialize, Serialize};

use super::{Params, ZabbixApi, ZabbixError};

/// A named group of items on a host or template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Application {
    /// Empty until the application is created.
    #[serde(rename = "applicationid", skip_serializing_if = "String::is_empty")]
    pub application_id: String,
    /// Owning host or template.
    #[serde(rename = "hostid")]
    pub host_id: String,
    /// Application name.
    pub name: String,
}

impl ZabbixApi {
    /// `application.get`
    pub async fn applications_get(&self, params: Params) -> Result<Vec<Application>, ZabbixError> {
        self.get_objects("application.get", params).await
    }

    /// `application.create`; fills in the id of every created application.
    pub async fn applications_create(
        &self,
        applications: &mut [Application],
    ) -> Result<(), ZabbixError> {
        let ids = self
            .create_objects("application.create", applications, "applicationids")
            .await?;
        for (application, id) in applications.iter_mut().zip(ids) {
            application.application_id = id;
        }
        Ok(())
    }

    /// `application.delete`
    pub async fn applications_delete_by_ids(&self, ids: &[String]) -> Result<(), ZabbixError> {
        self.delete_ids("application.delete", ids, "applicationids")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zabbix::mock;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_fills_ids() {
        let (server, api) = mock::server().await;
        mock::respond(&server, "application.create", json!({"applicationids": ["551"]})).await;

        let mut apps = vec![Application {
            host_id: "10084".to_string(),
            name: "CPU".to_string(),
            ..Default::default()
        }];
        api.applications_create(&mut apps).await.unwrap();
        assert_eq!(apps[0].application_id, "551");

        let body = mock::request_body(&server, "application.create").await;
        assert_eq!(body["params"], json!([{"hostid": "10084", "name": "CPU"}]));
    }

    #[tokio::test]
    async fn test_get_ignores_unknown_fields() {
        let (server, api) = mock::server().await;
        mock::respond(
            &server,
            "application.get",
            json!([{"applicationid": "551", "hostid": "10084", "name": "CPU", "flags": "0", "templateids": []}]),
        )
        .await;

        let apps = api.applications_get(Params::new()).await.unwrap();
        assert_eq!(
            apps,
            vec![Application {
                application_id: "551".to_string(),
                host_id: "10084".to_string(),
                name: "CPU".to_string(),
            }]
        );
    }
}
