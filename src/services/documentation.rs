use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the room registry.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::register_room,
        crate::routes::rooms::update_room,
        crate::routes::rooms::remove_room,
        crate::routes::rooms::clear_rooms,
        crate::routes::sse::rooms_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rooms::RoomsResponse,
            crate::dto::rooms::UpdateRoomRequest,
            crate::dto::ws::RegistryInboundMessage,
            crate::dto::ws::RegistryOutboundMessage,
            crate::state::registry::RoomDraft,
            crate::state::registry::RoomInfo,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room registry queries and commands"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "registry", description = "WebSocket protocol for room observers"),
    )
)]
pub struct ApiDoc;
