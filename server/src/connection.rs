use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use whiteboard_system::{bincode, serde_json, ClientMessage, ParticipantId, ServerMessage};

use crate::config::ServerConfig;
use crate::connection_tx_storage::ConnectionTx;
use crate::server::{Route, ServerHandle, ServerTx};

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        from: ParticipantId,
        tx: ConnectionTx,
    },
    Disconnect {
        from: ParticipantId,
    },
    /// Leaves whatever session the participant is in, if any.
    Depart {
        from: ParticipantId,
    },
    /// A create or join. Once it succeeds the participant departs from
    /// whatever session it holds on the `elsewhere` loops.
    Enter {
        from: ParticipantId,
        message: ClientMessage,
        elsewhere: Vec<ServerTx>,
    },
    Inbound {
        from: ParticipantId,
        message: ClientMessage,
    },
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ServerMessage);

/// Replies go out in the encoding the client last used.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Encoding {
    Json,
    Bincode,
}

struct ConnectionActor {
    id: ParticipantId,
    server: web::Data<ServerHandle>,
    tx: ConnectionTx,
    rx: Option<UnboundedReceiver<ServerMessage>>,
    route: Route,
    encoding: Encoding,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl ConnectionActor {
    fn new(server: web::Data<ServerHandle>, config: &ServerConfig) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            id: server.next_participant_id(),
            server,
            tx,
            rx: Some(rx),
            route: Route::default(),
            encoding: Encoding::Json,
            last_heartbeat: Instant::now(),
            heartbeat_interval: config.heartbeat_interval(),
            client_timeout: config.client_timeout(),
        }
    }

    fn ingress(&mut self, message: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        log::debug!("Ingress {:?}", message);
        if self
            .server
            .submit(self.id, &self.tx, &self.route, message)
            .is_err()
        {
            log::error!("Session loop is gone, closing connection {}", self.id);
            ctx.close(Some(CloseReason {
                code: CloseCode::Error,
                description: None,
            }));
            ctx.stop();
        }
    }

    fn close_invalid(&self, ctx: &mut ws::WebsocketContext<Self>, description: String) {
        log::warn!("Closing connection {}: {}", self.id, description);
        ctx.close(Some(CloseReason {
            code: CloseCode::Invalid,
            description: Some(description),
        }));
        ctx.stop();
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if self.server.connect(self.id, self.tx.clone()).is_err() {
            log::error!("Session loop is gone, refusing connection {}", self.id);
            ctx.stop();
            return;
        }

        if let Some(mut rx) = self.rx.take() {
            let addr = ctx.address().recipient();
            let id = self.id;
            tokio::spawn(async move {
                log::debug!("Egress task for {} started", id);
                while let Some(message) = rx.recv().await {
                    addr.do_send(ConnectionActorMessage(message));
                }
                log::debug!("Egress task for {} terminated", id);
            });
        }

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                log::info!("Participant {} missed its heartbeat, dropping", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if self.server.disconnect(self.id).is_err() {
            log::warn!("Session loop is gone while disconnecting {}", self.id);
        }
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.encoding = Encoding::Json;
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => self.ingress(message, ctx),
                    Err(e) => self.close_invalid(ctx, format!("malformed message: {}", e)),
                }
            }
            Ok(ws::Message::Binary(bin)) => {
                log::debug!("Ingress size: {}", bin.len());
                self.last_heartbeat = Instant::now();
                self.encoding = Encoding::Bincode;
                match bincode::deserialize::<ClientMessage>(&bin) {
                    Ok(message) => self.ingress(message, ctx),
                    Err(e) => self.close_invalid(ctx, format!("malformed message: {}", e)),
                }
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                self.close_invalid(ctx, "fragmented frames are not supported".into());
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                log::warn!("Protocol error on connection {}: {}", self.id, e);
                ctx.stop();
            }
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        let message = msg.0;
        log::debug!("Egress {:?}", message);
        self.route.observe(&message);
        match self.encoding {
            Encoding::Json => match serde_json::to_string(&message) {
                Ok(text) => ctx.text(text),
                Err(e) => log::error!("Could not encode {:?}: {}", message, e),
            },
            Encoding::Bincode => match bincode::serialize(&message) {
                Ok(bin) => ctx.binary(bin),
                Err(e) => log::error!("Could not encode {:?}: {}", message, e),
            },
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    server: web::Data<ServerHandle>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, Error> {
    ws::start(ConnectionActor::new(server, &config), &req, stream)
}
