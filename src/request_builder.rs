//! Turns upstream snapshots, session state and caller requests into a [`DeliveryRequest`].
//!
//! Everything here is a pure function of its inputs. All preconditions are checked before anything
//! is built, so a rejected request never reaches the transport.
use std::collections::{BTreeMap, HashMap};

use reqwest::Url;

use crate::{
    delivery::{
        Application, Channel, Context, CustomerId, DeliveryRequest, DeviceType, MboxRequest,
        MobilePlatform, Order, PlatformType, PrefetchRequest, Product, Property, Screen,
        VisitorIds,
    },
    parameters::{PrefetchMbox, TargetOrder, TargetParameters, TargetProduct},
    session::SessionSnapshot,
    shared_state::{
        ConfigurationSnapshot, IdentitySnapshot, LifecycleSnapshot, PrivacyStatus,
        SharedStateName,
    },
    Error, Result,
};

const DELIVERY_PATH: &str = "/rest/v1/delivery/";
const DEFAULT_HOST_SUFFIX: &str = "tt.omtrdc.net";

/// Parameter reserved for the property token, which travels in its own request field.
const PROPERTY_TOKEN_PARAMETER: &str = "at_property";

/// Upstream state that passed every precondition.
#[derive(Debug, Clone, Copy)]
pub struct Preconditions<'a> {
    pub client_code: &'a str,
    pub configuration: &'a ConfigurationSnapshot,
    pub lifecycle: &'a LifecycleSnapshot,
    pub identity: &'a IdentitySnapshot,
}

/// Check everything a prefetch needs before any request is built.
///
/// Each unmet condition maps to its own [`Error`] variant.
pub fn check_preconditions<'a>(
    identity: Option<&'a IdentitySnapshot>,
    configuration: Option<&'a ConfigurationSnapshot>,
    lifecycle: Option<&'a LifecycleSnapshot>,
    prefetch_mboxes: &[PrefetchMbox],
) -> Result<Preconditions<'a>> {
    if prefetch_mboxes.is_empty() {
        return Err(Error::EmptyPrefetchRequests);
    }
    if let Some(index) = prefetch_mboxes.iter().position(|mbox| mbox.name.is_empty()) {
        return Err(Error::InvalidMboxName { index });
    }

    let configuration =
        configuration.ok_or(Error::MissingSharedState(SharedStateName::Configuration))?;
    let client_code = configuration
        .client_code()
        .ok_or(Error::MissingClientCode)?;
    if configuration.privacy != Some(PrivacyStatus::OptedIn) {
        return Err(Error::PrivacyNotOptedIn(configuration.privacy));
    }

    let lifecycle = lifecycle.ok_or(Error::MissingSharedState(SharedStateName::Lifecycle))?;
    let identity = identity.ok_or(Error::MissingSharedState(SharedStateName::Identity))?;

    Ok(Preconditions {
        client_code,
        configuration,
        lifecycle,
        identity,
    })
}

/// Build the delivery request for `prefetch_mboxes`, preserving their order.
pub fn build_delivery_request(
    identity: Option<&IdentitySnapshot>,
    configuration: Option<&ConfigurationSnapshot>,
    lifecycle: Option<&LifecycleSnapshot>,
    session: &SessionSnapshot,
    prefetch_mboxes: &[PrefetchMbox],
    global_parameters: Option<&TargetParameters>,
) -> Result<DeliveryRequest> {
    let checked = check_preconditions(identity, configuration, lifecycle, prefetch_mboxes)?;

    let mboxes = prefetch_mboxes
        .iter()
        .enumerate()
        .map(|(index, mbox)| mbox_request(index, mbox, global_parameters))
        .collect();

    let id = visitor_ids(session, checked.identity);

    let request = DeliveryRequest {
        id: (!id.is_empty()).then_some(id),
        context: Some(context(checked.lifecycle)),
        environment_id: checked.configuration.environment_id,
        property: checked.configuration.property_token().map(|token| Property {
            token: token.to_owned(),
        }),
        prefetch: PrefetchRequest { mboxes },
    };

    log::trace!(target: "mbox_prefetch",
                mbox_count = request.prefetch.mboxes.len(),
                client_code = checked.client_code;
                "built delivery request");

    Ok(request)
}

/// Endpoint for a delivery call.
///
/// The host is the edge host from a previous response when known, then the configured server,
/// then the client code's default host.
pub fn delivery_url(
    client_code: &str,
    configuration: &ConfigurationSnapshot,
    session: &SessionSnapshot,
) -> Result<Url> {
    let host = match session
        .edge_host
        .as_deref()
        .filter(|host| !host.is_empty())
        .or_else(|| configuration.server())
    {
        Some(host) => host.to_owned(),
        None => format!("{client_code}.{DEFAULT_HOST_SUFFIX}"),
    };

    Url::parse_with_params(
        &format!("https://{host}{DELIVERY_PATH}"),
        &[
            ("client", client_code),
            ("sessionId", session.session_id.as_str()),
        ],
    )
    .map_err(Error::InvalidServer)
}

/// Merge global and per-mbox parameters. Per-mbox values win on collision.
pub fn merge_parameters(
    global: Option<&HashMap<String, String>>,
    local: Option<&HashMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged = overlay(global, local);
    merged.remove(PROPERTY_TOKEN_PARAMETER);
    merged
}

fn overlay(
    global: Option<&HashMap<String, String>>,
    local: Option<&HashMap<String, String>>,
) -> BTreeMap<String, String> {
    global
        .into_iter()
        .chain(local)
        .flatten()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn mbox_request(
    index: usize,
    mbox: &PrefetchMbox,
    global: Option<&TargetParameters>,
) -> MboxRequest {
    let local = mbox.target_parameters.as_ref();

    let parameters = merge_parameters(
        global.map(|p| &p.parameters),
        local.map(|p| &p.parameters),
    );
    let profile_parameters = overlay(
        global.map(|p| &p.profile_parameters),
        local.map(|p| &p.profile_parameters),
    );

    let order = local
        .and_then(|p| p.order.as_ref())
        .or_else(|| global.and_then(|p| p.order.as_ref()))
        .map(order_request);
    let product = local
        .and_then(|p| p.product.as_ref())
        .or_else(|| global.and_then(|p| p.product.as_ref()))
        .map(product_request);

    MboxRequest {
        index,
        name: mbox.name.clone(),
        parameters,
        profile_parameters,
        order,
        product,
    }
}

fn order_request(order: &TargetOrder) -> Order {
    Order {
        id: order.id.clone(),
        total: order.total,
        purchased_product_ids: order.purchased_product_ids.clone(),
    }
}

fn product_request(product: &TargetProduct) -> Product {
    Product {
        id: product.product_id.clone(),
        category_id: product.category_id.clone(),
    }
}

fn visitor_ids(session: &SessionSnapshot, identity: &IdentitySnapshot) -> VisitorIds {
    VisitorIds {
        tnt_id: session.tnt_id.clone(),
        third_party_id: session.third_party_id.clone(),
        marketing_cloud_visitor_id: identity.marketing_cloud_id.clone(),
        customer_ids: identity
            .visitor_ids
            .iter()
            .filter_map(|visitor| {
                let id = visitor.id.as_deref().filter(|id| !id.is_empty())?;
                Some(CustomerId {
                    id: id.to_owned(),
                    integration_code: visitor.id_type.clone(),
                    authenticated_state: visitor.authentication_state,
                })
            })
            .collect(),
    }
}

fn context(lifecycle: &LifecycleSnapshot) -> Context {
    let platform_type = lifecycle.os_version().and_then(|os| {
        let os = os.to_ascii_lowercase();
        if os.contains("android") {
            Some(PlatformType::Android)
        } else if os.contains("ios") || os.contains("iphone") || os.contains("ipados") {
            Some(PlatformType::Ios)
        } else {
            None
        }
    });

    let mobile_platform = platform_type.map(|platform_type| {
        let device_name = lifecycle.device_name();
        let is_tablet = device_name
            .map(|name| {
                let name = name.to_ascii_lowercase();
                name.contains("ipad") || name.contains("tablet")
            })
            .unwrap_or(false);
        MobilePlatform {
            device_name: device_name.map(str::to_owned),
            device_type: if is_tablet {
                DeviceType::Tablet
            } else {
                DeviceType::Phone
            },
            platform_type,
        }
    });

    Context {
        channel: Channel::Mobile,
        mobile_platform,
        application: lifecycle.app_id().and_then(application),
        screen: lifecycle
            .resolution()
            .map(|(width, height)| Screen { width, height }),
    }
}

/// Parse an app id of the form `Name 1.2.3 (45)`.
fn application(app_id: &str) -> Option<Application> {
    let app_id = match app_id.rfind(" (") {
        Some(pos) if app_id.ends_with(')') => &app_id[..pos],
        _ => app_id,
    }
    .trim();
    if app_id.is_empty() {
        return None;
    }

    let application = match app_id.rsplit_once(' ') {
        Some((name, version)) if version.starts_with(|c: char| c.is_ascii_digit()) => {
            Application {
                name: name.trim().to_owned(),
                version: Some(version.to_owned()),
            }
        }
        _ => Application {
            name: app_id.to_owned(),
            version: None,
        },
    };
    Some(application)
}
