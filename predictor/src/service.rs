use std::sync::Arc;

use shared::{
    PositionPredictionRequest, PositionPredictionResponse, ShapeDetailsResponse,
    TimePredictionByCoordinatesRequest, TimePredictionByDistanceRequest, TimePredictionResponse,
    VehicleDetailsResponse,
};

use crate::cache::RouteIndexCache;
use crate::config::PredictorConfig;
use crate::error::PredictionError;
use crate::estimator::{
    StoredShape, TravelEstimator, offset_by_seconds, predict_arrival,
};
use crate::models::{Route, ShapeId, SpeedEstimate};
use crate::projector::RouteProjector;
use crate::store::{ShapeStore, StoreError, TelemetryStore};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

/// Everything derived while measuring a vehicle's speed on its shape.
pub struct SpeedContext {
    pub route: Route,
    pub projector: Arc<RouteProjector>,
    pub estimate: SpeedEstimate,
}

/// Answers prediction requests from shape and telemetry collaborators.
pub struct PredictionService<S, T> {
    shapes: S,
    telemetry: T,
    cache: RouteIndexCache,
    config: PredictorConfig,
}

impl<S: ShapeStore, T: TelemetryStore> PredictionService<S, T> {
    pub fn new(shapes: S, telemetry: T, config: PredictorConfig) -> Self {
        Self {
            shapes,
            telemetry,
            cache: RouteIndexCache::new(config.cache_capacity),
            config,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn cache(&self) -> &RouteIndexCache {
        &self.cache
    }

    fn load_route(&self, shape_id: ShapeId) -> Result<(Route, Arc<RouteProjector>), ServiceError> {
        let vertices = self.shapes.shape_points(shape_id)?;
        tracing::info!("retrieved {} route points for shape {shape_id}", vertices.len());
        let route = Route::new(vertices)?;
        let projector = self
            .cache
            .get_or_build(shape_id, &route, self.config.neighbor_count)?;
        Ok((route, projector))
    }

    fn estimator<'a>(
        &self,
        projector: &'a RouteProjector,
        lookup: &'a StoredShape<'a, S>,
    ) -> TravelEstimator<'a, StoredShape<'a, S>> {
        TravelEstimator::new(projector, lookup, self.config.max_projection_distance)
    }

    /// Average speed of `vehicle_id` between two of its recorded fixes.
    pub fn calculate_average_speed(
        &self,
        vehicle_id: &str,
        shape_id: ShapeId,
        first_index: isize,
        last_index: isize,
    ) -> Result<SpeedContext, ServiceError> {
        validate_vehicle_id(vehicle_id)?;
        let (route, projector) = self.load_route(shape_id)?;
        let fixes = self.telemetry.positions(vehicle_id)?;
        tracing::info!("retrieved {} positions for vehicle {vehicle_id}", fixes.len());

        let lookup = StoredShape::new(&self.shapes, shape_id);
        let estimate = self
            .estimator(&projector, &lookup)
            .estimate_speed(&fixes, first_index, last_index)
            .inspect_err(|err| tracing::error!("error calculating average speed: {err}"))?;

        Ok(SpeedContext {
            route,
            projector,
            estimate,
        })
    }

    /// Where the vehicle will be `prediction_time_seconds` from its last fix.
    pub fn predict_position(
        &self,
        req: &PositionPredictionRequest,
    ) -> Result<PositionPredictionResponse, ServiceError> {
        tracing::info!(
            "predicting position for vehicle {} in {} seconds",
            req.vehicle_id,
            req.prediction_time_seconds
        );
        let max = self.config.max_prediction_seconds;
        if req.prediction_time_seconds == 0 || req.prediction_time_seconds > max {
            tracing::warn!(
                "rejected prediction horizon of {}s",
                req.prediction_time_seconds
            );
            return Err(ServiceError::InvalidRequest(format!(
                "prediction time must be between 1 and {max} seconds"
            )));
        }

        let ctx = self.calculate_average_speed(
            &req.vehicle_id,
            req.shape_id,
            req.first_index,
            req.last_index,
        )?;
        let lookup = StoredShape::new(&self.shapes, req.shape_id);
        let seconds = f64::from(req.prediction_time_seconds);
        let predicted = self
            .estimator(&ctx.projector, &lookup)
            .predict_position_after(
                seconds,
                ctx.estimate.speed(),
                ctx.estimate.last_distance,
                &ctx.route.distance_table(),
            )
            .inspect_err(|err| tracing::error!("error calculating predicted position: {err}"))?;

        Ok(PositionPredictionResponse {
            vehicle_id: req.vehicle_id.clone(),
            last_known_distance_traveled: Some(ctx.estimate.last_distance),
            predicted_location: predicted.point,
            predicted_distance_traveled: predicted.distance,
            target_arrival_time: offset_by_seconds(ctx.estimate.last_timestamp, seconds),
            target_seconds_to_arrival: req.prediction_time_seconds,
            average_speed: Some(ctx.estimate.speed()),
            message: "Position prediction calculated successfully".to_string(),
        })
    }

    /// When the vehicle will reach a cumulative distance along its shape.
    pub fn predict_arrival_by_distance(
        &self,
        req: &TimePredictionByDistanceRequest,
    ) -> Result<TimePredictionResponse, ServiceError> {
        tracing::info!(
            "predicting arrival of vehicle {} at {}m",
            req.vehicle_id,
            req.target_distance_traveled
        );
        if !req.target_distance_traveled.is_finite() {
            return Err(ServiceError::InvalidRequest(format!(
                "target distance must be finite, got {}",
                req.target_distance_traveled
            )));
        }
        let ctx = self.calculate_average_speed(
            &req.vehicle_id,
            req.shape_id,
            req.first_index,
            req.last_index,
        )?;
        let target = req.target_distance_traveled;
        let arrival = predict_arrival(
            target,
            ctx.estimate.speed(),
            ctx.estimate.last_distance,
            ctx.estimate.last_timestamp,
        )?;

        let lookup = StoredShape::new(&self.shapes, req.shape_id);
        let location = self
            .estimator(&ctx.projector, &lookup)
            .position_at_distance(&ctx.route.distance_table(), target)?;
        tracing::info!(
            "predicted time: {:.1}s or {:.2} min",
            arrival.seconds_to_arrival,
            arrival.seconds_to_arrival / 60.0
        );

        Ok(TimePredictionResponse {
            vehicle_id: req.vehicle_id.clone(),
            last_known_distance_traveled: Some(ctx.estimate.last_distance),
            target_location: location.point,
            target_distance_traveled: Some(target),
            predicted_arrival_time: Some(arrival.eta),
            predicted_seconds_to_arrival: Some(arrival.seconds_to_arrival),
            current_speed: Some(ctx.estimate.speed()),
            message: "Prediction calculated successfully".to_string(),
        })
    }

    /// When the vehicle will reach the route point closest to a location.
    pub fn predict_arrival_by_coordinates(
        &self,
        req: &TimePredictionByCoordinatesRequest,
    ) -> Result<TimePredictionResponse, ServiceError> {
        tracing::info!(
            "predicting arrival of vehicle {} at {:?}",
            req.vehicle_id,
            req.target_location
        );
        let ctx = self.calculate_average_speed(
            &req.vehicle_id,
            req.shape_id,
            req.first_index,
            req.last_index,
        )?;

        let lookup = StoredShape::new(&self.shapes, req.shape_id);
        let (corrected, target) = self
            .estimator(&ctx.projector, &lookup)
            .locate(req.target_location)?;
        tracing::info!("distance to predict: {target:.2}m");

        let arrival = predict_arrival(
            target,
            ctx.estimate.speed(),
            ctx.estimate.last_distance,
            ctx.estimate.last_timestamp,
        )?;

        Ok(TimePredictionResponse {
            vehicle_id: req.vehicle_id.clone(),
            last_known_distance_traveled: Some(ctx.estimate.last_distance),
            target_location: corrected.point,
            target_distance_traveled: Some(target),
            predicted_arrival_time: Some(arrival.eta),
            predicted_seconds_to_arrival: Some(arrival.seconds_to_arrival),
            current_speed: Some(ctx.estimate.speed()),
            message: "Prediction calculated successfully".to_string(),
        })
    }

    /// Last known position of a vehicle and how far along its shape it is.
    pub fn vehicle_details(
        &self,
        vehicle_id: &str,
        shape_id: ShapeId,
    ) -> Result<VehicleDetailsResponse, ServiceError> {
        validate_vehicle_id(vehicle_id)?;
        let (route, projector) = self.load_route(shape_id)?;
        let fixes = self.telemetry.positions(vehicle_id)?;
        let last = fixes
            .last()
            .ok_or_else(|| StoreError::UnknownVehicle(vehicle_id.to_string()))?;

        let lookup = StoredShape::new(&self.shapes, shape_id);
        let (_, distance) = self.estimator(&projector, &lookup).locate(last.point)?;

        Ok(VehicleDetailsResponse {
            vehicle_id: vehicle_id.to_string(),
            shape_id,
            last_position: last.point,
            last_distance_traveled: distance,
            total_route_distance: route.max_distance(),
        })
    }

    pub fn shape_details(&self, shape_id: ShapeId) -> Result<ShapeDetailsResponse, ServiceError> {
        let vertices = self.shapes.shape_points(shape_id)?;
        Ok(ShapeDetailsResponse {
            shape_id,
            points: vertices.into_iter().map(|v| v.point).collect(),
        })
    }
}

/// Vehicle ids are namespaced, e.g. `buses:712`.
fn validate_vehicle_id(vehicle_id: &str) -> Result<(), ServiceError> {
    if vehicle_id.contains(':') {
        return Ok(());
    }
    tracing::error!("invalid vehicle id format: {vehicle_id}");
    Err(ServiceError::InvalidRequest(format!(
        "vehicle id {vehicle_id:?} must have the form <fleet>:<id>"
    )))
}
