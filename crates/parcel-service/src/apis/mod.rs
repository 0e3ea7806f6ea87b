//! API endpoint implementations.

pub mod order;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use parcel_core::contract::ContractError;
use parcel_core::workflow::WorkflowError;
use parcel_delivery::DeliveryError;
use parcel_types::ErrorResponse;

/// Error returned by an endpoint, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	message: String,
}

impl ApiError {
	pub fn bad_request(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::BAD_REQUEST,
			message: message.into(),
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			message: message.into(),
		}
	}
}

impl From<WorkflowError> for ApiError {
	fn from(err: WorkflowError) -> Self {
		let status = match &err {
			WorkflowError::InvalidInput(_) | WorkflowError::AlreadyDelivered(_) => {
				StatusCode::BAD_REQUEST
			}
			WorkflowError::OrderNotFound(_) | WorkflowError::NotDeliverable(_) => {
				StatusCode::NOT_FOUND
			}
			WorkflowError::Contract(ContractError::TokenNotFound(_)) => StatusCode::NOT_FOUND,
			WorkflowError::Contract(ContractError::InvalidInput(_))
			| WorkflowError::Contract(ContractError::Delivery(DeliveryError::InvalidInput(_))) => {
				StatusCode::BAD_REQUEST
			}
			WorkflowError::Contract(_) | WorkflowError::Storage(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		};
		if status.is_server_error() {
			tracing::error!(error = %err, "Request failed");
		} else {
			tracing::warn!(error = %err, "Request rejected");
		}
		Self {
			status,
			message: err.to_string(),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(ErrorResponse { error: self.message })).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parcel_storage::StorageError;

	#[test]
	fn test_workflow_error_status_mapping() {
		let cases = [
			(WorkflowError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
			(WorkflowError::AlreadyDelivered("a".into()), StatusCode::BAD_REQUEST),
			(WorkflowError::OrderNotFound("a".into()), StatusCode::NOT_FOUND),
			(WorkflowError::NotDeliverable("a".into()), StatusCode::NOT_FOUND),
			(
				ContractError::TokenNotFound("7".into()).into(),
				StatusCode::NOT_FOUND,
			),
			(
				ContractError::Delivery(DeliveryError::Connectivity("down".into())).into(),
				StatusCode::INTERNAL_SERVER_ERROR,
			),
			(
				StorageError::Backend("disk full".into()).into(),
				StatusCode::INTERNAL_SERVER_ERROR,
			),
		];

		for (err, expected) in cases {
			let message = err.to_string();
			let api_error = ApiError::from(err);
			assert_eq!(api_error.status, expected, "{}", message);
			assert_eq!(api_error.message, message);
		}
	}
}
