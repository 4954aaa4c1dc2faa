//! Image label resolution for the Scaleway backend.
//!
//! Project-scoped images win over public ones; within the chosen source the
//! newest available image for the requested architecture is used.

use std::future::Future;

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};

use crate::backend::FleetRequest;

use super::super::{ScalewayBackend, ScalewayBackendError};

const AVAILABLE: &str = "available";

impl ScalewayBackend {
    fn image_query(&self, request: &FleetRequest) -> ScalewayListInstanceImagesBuilder {
        ScalewayListInstanceImagesBuilder::new(self.api.clone(), &request.zone)
            .public(true)
            .name(&request.image_label)
            .arch(&request.architecture)
    }

    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        request: &FleetRequest,
    ) -> Result<String, ScalewayBackendError> {
        self.resolve_image_id_with(
            request,
            || async move {
                let scoped = self.image_query(request).project(&request.project_id);
                let query = match &request.organisation_id {
                    Some(org) => scoped.organization(org),
                    None => scoped,
                };
                query.run_async().await.map_err(ScalewayBackendError::from)
            },
            || async move {
                self.image_query(request)
                    .run_async()
                    .await
                    .map_err(ScalewayBackendError::from)
            },
        )
        .await
    }

    /// Resolves an image using the supplied lookups. `public_fetch` only runs
    /// when the project lookup returns nothing.
    pub(in crate::scaleway) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
        &self,
        request: &FleetRequest,
        project_fetch: FetchA,
        public_fetch: FetchB,
    ) -> Result<String, ScalewayBackendError>
    where
        FetchA: FnOnce() -> FutA,
        FetchB: FnOnce() -> FutB,
        FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayBackendError>>,
        FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayBackendError>>,
    {
        let project_images = project_fetch().await?;
        let images = if project_images.is_empty() {
            public_fetch().await?
        } else {
            project_images
        };
        Self::newest_available(images, request)
    }

    pub(in crate::scaleway) fn newest_available(
        images: Vec<ScalewayImage>,
        request: &FleetRequest,
    ) -> Result<String, ScalewayBackendError> {
        images
            .into_iter()
            .filter(|image| image.arch == request.architecture && image.state == AVAILABLE)
            .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
            .map(|image| image.id)
            .ok_or_else(|| ScalewayBackendError::ImageNotFound {
                label: request.image_label.clone(),
                arch: request.architecture.clone(),
                zone: request.zone.clone(),
            })
    }
}
