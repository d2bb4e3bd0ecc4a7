use std::sync::Arc;

use crate::application::auth::SessionAuthService;
use crate::application::travel_data::TravelDataService;
use crate::application::upload_sessions::UploadSessionService;

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<SessionAuthService>,
    pub travel_data: Arc<TravelDataService>,
    pub upload_sessions: Arc<UploadSessionService>,
}
