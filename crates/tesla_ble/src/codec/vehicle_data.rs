use prost::Message;

use crate::error::ProtocolError;
use crate::pb::tesla::ble::car_server::{self, action, get_vehicle_data, vehicle_action, Action, Response, VehicleAction};

/// The twelve vehicle-data categories `get_vehicle_data` can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleDataCategory {
    Charge,
    Climate,
    Drive,
    Location,
    Closures,
    ChargeSchedule,
    PreconditioningSchedule,
    TirePressure,
    Media,
    MediaDetail,
    SoftwareUpdate,
    ParentalControls,
}

impl VehicleDataCategory {
    fn into_request(self) -> get_vehicle_data::VehicleDataRequest {
        use get_vehicle_data::VehicleDataRequest as R;
        match self {
            VehicleDataCategory::Charge => R::GetChargeState(car_server::ChargeStateRequest {}),
            VehicleDataCategory::Climate => R::GetClimateState(car_server::ClimateStateRequest {}),
            VehicleDataCategory::Drive => R::GetDriveState(car_server::DriveStateRequest {}),
            VehicleDataCategory::Location => R::GetLocationState(car_server::LocationStateRequest {}),
            VehicleDataCategory::Closures => R::GetClosuresState(car_server::ClosuresStateRequest {}),
            VehicleDataCategory::ChargeSchedule => {
                R::GetChargeScheduleState(car_server::ChargeScheduleStateRequest {})
            }
            VehicleDataCategory::PreconditioningSchedule => {
                R::GetPreconditioningScheduleState(car_server::PreconditioningScheduleStateRequest {})
            }
            VehicleDataCategory::TirePressure => R::GetTirePressureState(car_server::TirePressureStateRequest {}),
            VehicleDataCategory::Media => R::GetMediaState(car_server::MediaStateRequest {}),
            VehicleDataCategory::MediaDetail => R::GetMediaDetailState(car_server::MediaDetailStateRequest {}),
            VehicleDataCategory::SoftwareUpdate => {
                R::GetSoftwareUpdateState(car_server::SoftwareUpdateStateRequest {})
            }
            VehicleDataCategory::ParentalControls => {
                R::GetParentalControlsState(car_server::ParentalControlsStateRequest {})
            }
        }
    }
}

/// Encode the plaintext `CarServer.Action` payload for a `GetVehicleData`
/// request. This is the plaintext that gets AES-GCM encrypted by the
/// façade before being placed in `protobufMessageAsBytes`.
pub fn encode_get_vehicle_data(category: VehicleDataCategory) -> Vec<u8> {
    let action = Action {
        action_msg: Some(action::ActionMsg::VehicleAction(VehicleAction {
            vehicle_action_msg: Some(vehicle_action::VehicleActionMsg::GetVehicleData(
                car_server::GetVehicleData {
                    vehicle_data_request: Some(category.into_request()),
                },
            )),
        })),
    };

    action.encode_to_vec()
}

/// Decode a (decrypted) `CarServer.Response` payload.
pub fn decode_car_server_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
    Response::decode(bytes).map_err(ProtocolError::from)
}

/// `true` when the decoded response represents a vehicle-reported error
/// (`action_status.result == 1`).
pub fn response_is_error(response: &Response) -> bool {
    response.action_status.as_ref().map(|s| s.result == 1).unwrap_or(false)
}

/// The human-readable reason for a vehicle-reported error, if present.
pub fn response_error_reason(response: &Response) -> Option<&str> {
    response
        .action_status
        .as_ref()
        .and_then(|s| s.result_reason.as_ref())
        .map(|r| r.plain_text.as_str())
}
