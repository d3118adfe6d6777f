//! Static catalog of municipal service types and their extra-field schemas.
//!
//! The catalog is built once, checked for integrity, and never mutated.
//! Callers that hit an unknown service id get a `Config` error: that means
//! the UI and the registry disagree, not that the citizen did something wrong.

use std::collections::HashSet;
use std::sync::LazyLock;

use shared_types::{FieldDefinition, FieldKind, PortalError, SelectOption, ServiceDefinition};

use crate::evaluator::compile_pattern;

#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ServiceDefinition>,
}

static BUILTIN: LazyLock<Result<ServiceRegistry, PortalError>> =
    LazyLock::new(|| ServiceRegistry::new(builtin_services()));

impl ServiceRegistry {
    /// Build a registry, rejecting definitions that would break single-pass evaluation.
    pub fn new(services: Vec<ServiceDefinition>) -> Result<Self, PortalError> {
        let mut ids = HashSet::new();
        let mut codes = HashSet::new();
        for service in &services {
            if !ids.insert(service.id.as_str()) {
                return Err(PortalError::config(format!(
                    "Duplicate service id: {}",
                    service.id
                )));
            }
            if !codes.insert(service.code.as_str()) {
                return Err(PortalError::config(format!(
                    "Duplicate service code: {}",
                    service.code
                )));
            }
            check_fields(service)?;
        }
        Ok(Self { services })
    }

    /// The portal's built-in service catalog.
    pub fn builtin() -> Result<&'static ServiceRegistry, PortalError> {
        BUILTIN.as_ref().map_err(Clone::clone)
    }

    pub fn all(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.id == service_id)
    }

    pub fn lookup(&self, service_id: &str) -> Result<&ServiceDefinition, PortalError> {
        self.get(service_id).ok_or_else(|| {
            PortalError::config(format!("Service not found for ID: {service_id}"))
        })
    }

    /// Stable backend code for an internal service id.
    pub fn code_for(&self, service_id: &str) -> Result<&str, PortalError> {
        self.lookup(service_id).map(|s| s.code.as_str())
    }

    pub fn service_id_for_code(&self, code: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.code == code)
            .map(|s| s.id.as_str())
    }

    pub fn service_name_for_code(&self, code: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.code == code)
            .map(|s| s.name.as_str())
    }
}

fn check_fields(service: &ServiceDefinition) -> Result<(), PortalError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for field in &service.fields {
        let context = format!("{}.{}", service.id, field.name);

        if let Some(visibility) = &field.visibility {
            // Dependencies must point backwards; evaluation is one pass, one hop.
            if !seen.contains(visibility.depends_on_field.as_str()) {
                return Err(PortalError::config(format!(
                    "{context} depends on '{}' which is not an earlier field",
                    visibility.depends_on_field
                )));
            }
        }
        if !seen.insert(field.name.as_str()) {
            return Err(PortalError::config(format!("Duplicate field name: {context}")));
        }
        if let FieldKind::Select { options } = &field.kind {
            if options.is_empty() {
                return Err(PortalError::config(format!("{context} has no options")));
            }
        }
        if let Some(pattern) = &field.validation_pattern {
            compile_pattern(pattern).map_err(|e| {
                PortalError::config(format!("{context} has an invalid pattern: {e}"))
            })?;
        }
    }
    Ok(())
}

// ── Built-in catalog ────────────────────────────────────────────────

fn select(options: &[(&str, &str)]) -> FieldKind {
    FieldKind::Select {
        options: options
            .iter()
            .map(|(value, label)| SelectOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect(),
    }
}

fn service(id: &str, name: &str, code: &str, fields: Vec<FieldDefinition>) -> ServiceDefinition {
    ServiceDefinition {
        id: id.to_string(),
        name: name.to_string(),
        code: code.to_string(),
        fields,
    }
}

fn builtin_services() -> Vec<ServiceDefinition> {
    use FieldKind::{Date, Qr, Text, Textarea, Time};

    vec![
        service(
            "electricite",
            "Électricité",
            "ELC",
            vec![
                FieldDefinition::new("accountNumber", "Numéro de compte électricité", Text)
                    .placeholder("ex: ELC-789012")
                    .required(),
                FieldDefinition::new("outageDate", "Date de la panne (si applicable)", Date),
                FieldDefinition::new(
                    "issueType",
                    "Type de problème",
                    select(&[
                        ("outage", "Panne de courant"),
                        ("voltage", "Fluctuation de tension"),
                        ("billing", "Problème de facturation"),
                        ("meter", "Problème de compteur"),
                        ("connection", "Nouvelle connexion"),
                        ("other", "Autre"),
                    ]),
                )
                .required(),
                FieldDefinition::new(
                    "affectedAppliances",
                    "Appareils affectés (si applicable)",
                    Textarea,
                )
                .placeholder("Liste des appareils endommagés..."),
            ],
        ),
        service(
            "smart-parking",
            "Smart Parking",
            "SPK",
            vec![
                FieldDefinition::new(
                    "issueCategory",
                    "Type de problème",
                    select(&[
                        ("payment_failure", "Paiement échoué"),
                        ("sensor_error", "Erreur capteur"),
                        ("illegal_parking", "Stationnement illégal"),
                        ("app_issue", "Problème Application"),
                    ]),
                )
                .required(),
                FieldDefinition::new("spotNumber", "Numéro de la place", Text)
                    .placeholder("Ex: P-1024")
                    .required()
                    .pattern(r"^P-\d{4}$"),
                FieldDefinition::new("licensePlate", "Matricule du véhicule", Text)
                    .placeholder("Ex: 12345-A-44")
                    .required()
                    .pattern(r"^\d{1,5}-[A-Za-z\x{0600}-\x{06FF}]-\d{1,2}$"),
                FieldDefinition::new("transactionId", "Référence de Transaction", Text)
                    .placeholder("Référence de la transaction")
                    .required()
                    .pattern(r"^[A-Za-z0-9_-]{5,30}$")
                    .visible_when("issueCategory", &["payment_failure"]),
            ],
        ),
        service(
            "smart-traffic",
            "Smart Traffic",
            "STR",
            vec![
                FieldDefinition::new(
                    "incidentType",
                    "Type d'incident",
                    select(&[
                        ("traffic_lights_malfunction", "Feux de signalisation en panne"),
                        ("unmanaged_congestion", "Embouteillage non géré"),
                        ("incorrect_information", "Information erronée"),
                        ("road_sign_damage", "Panneau endommagé"),
                    ]),
                )
                .required(),
                FieldDefinition::new("intersection", "Intersection / axe concerné", Text)
                    .placeholder("Ex: Bd Zerktouni x Bd Anfa")
                    .required(),
                FieldDefinition::new("incidentTime", "Heure de l'incident", Time)
                    .required()
                    .pattern(r"^([01]\d|2[0-3]):[0-5]\d$")
                    .visible_when(
                        "incidentType",
                        &["traffic_lights_malfunction", "unmanaged_congestion"],
                    ),
                FieldDefinition::new("informationSource", "Source de l'information", Text)
                    .placeholder("Application, panneau à message variable...")
                    .visible_when("incidentType", &["incorrect_information"]),
            ],
        ),
        service(
            "incendies",
            "Incendies",
            "INC",
            vec![
                FieldDefinition::new(
                    "issueSubtype",
                    "Type de signalement",
                    select(&[
                        ("manual_fire_report", "Signalement Incendie"),
                        ("equipment_failure", "Panne Équipement"),
                        ("evacuation_route_error", "Erreur Itinéraire"),
                        ("missed_alert", "Alerte Non Reçue"),
                        ("false_alert", "Fausse Alerte"),
                        ("alert_out_of_zone", "Alerte Hors Zone"),
                    ]),
                )
                .required(),
                FieldDefinition::new(
                    "hazardType",
                    "Type de feu",
                    select(&[
                        ("forest_fire", "Feu de forêt"),
                        ("urban_fire", "Incendie urbain"),
                        ("smoke", "Fumée"),
                    ]),
                )
                .required()
                .visible_when("issueSubtype", &["manual_fire_report"]),
                FieldDefinition::new(
                    "equipmentCondition",
                    "État de l'équipement",
                    select(&[
                        ("broken", "Cassé"),
                        ("stolen", "Volé"),
                        ("offline", "Hors ligne"),
                    ]),
                )
                .required()
                .visible_when("issueSubtype", &["equipment_failure"]),
                FieldDefinition::new("equipmentId", "Identifiant ID", Text)
                    .placeholder("Identifiant de l'équipement")
                    .visible_when("issueSubtype", &["equipment_failure"]),
                FieldDefinition::new("blockedRouteLocation", "Lieu du blocage", Text)
                    .placeholder("Localisation précise du blocage")
                    .required()
                    .visible_when("issueSubtype", &["evacuation_route_error"]),
                FieldDefinition::new(
                    "obstacleType",
                    "Type d'obstacle",
                    select(&[
                        ("fire", "Feu"),
                        ("debris", "Débris"),
                        ("locked_gate", "Portail verrouillé"),
                        ("embouteillage", "Embouteillage"),
                        ("other", "Autre"),
                    ]),
                )
                .required()
                .visible_when("issueSubtype", &["evacuation_route_error"]),
                FieldDefinition::new("userLocationAtTime", "Votre position réelle", Text)
                    .placeholder("Votre localisation lors de l'incident")
                    .visible_when(
                        "issueSubtype",
                        &["missed_alert", "false_alert", "alert_out_of_zone"],
                    ),
                FieldDefinition::new("alertReferenceId", "ID Alerte", Text)
                    .placeholder("Référence de l'alerte")
                    .visible_when("issueSubtype", &["false_alert", "alert_out_of_zone"]),
                FieldDefinition::new("distanceFromDanger", "Distance du danger", Text)
                    .placeholder("Distance approximative")
                    .visible_when("issueSubtype", &["alert_out_of_zone"]),
            ],
        ),
        service("touriste", "Touriste", "TOU", vec![]),
        service("tri-dechets", "Tri des Déchets", "TRD", vec![]),
        service("eau-potable", "Gestion de l'Eau Potable", "EAU", vec![]),
        service(
            "patrimoine",
            "Service Gestion Patrimoine",
            "PAT",
            vec![
                FieldDefinition::new(
                    "patrimoineType",
                    "Type de patrimoine",
                    select(&[
                        ("monument", "Monument historique"),
                        ("building", "Bâtiment classé"),
                        ("site", "Site culturel"),
                        ("other", "Autre"),
                    ]),
                )
                .required(),
                FieldDefinition::new("qrCode", "Scanner le code QR du patrimoine", Qr)
                    .placeholder("Cliquez pour scanner"),
                FieldDefinition::new("observations", "Observations", Textarea)
                    .placeholder("Détails supplémentaires..."),
            ],
        ),
        service("proprete-urbaine", "Service Propreté Urbaine", "PRU", vec![]),
    ]
}
