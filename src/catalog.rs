use crate::store::schema::{
    Column, Derivation, FieldDefault, TableSchema, TotalRow, WEEK_DAYS, WeeklyLayout,
};
use crate::store::value::Value;

pub const HR_SECTIONS: [&str; 8] = ["CT2-CT8", "CT3", "CT5", "CT6", "CT1", "CT4", "CT7", "CT9"];
pub const MACHINES: [&str; 3] = ["G11", "G20", "C12"];

type Families = [(&'static str, &'static [&'static str])];

const C8_FAMILIES: &[&str] = &[
    "Ablage C8 Hinten",
    "Kopfkasten C8 Hinten",
    "Polsterriegel C8 Hinten",
    "Deckel C8 Hinten",
    "Deckel C8 Vorne",
];
const SEIPO_SK_FAMILIES: &[&str] = &["SEIPO SK38", "SEIPO SK316"];
const SEIPO_VW_FAMILIES: &[&str] = &["SEIPO VW380", "SEIPO VW 382"];

/// Projects in form order, each with the product families it builds.
const CT1_CT4_FAMILIES: &Families = &[
    ("AB3/Q2", &["AB3/Q2 Agrafage"]),
    ("C8", C8_FAMILIES),
    ("C-BEV", &["C-BEV"]),
    ("D5", &["D5 Low"]),
    ("Seipo", &["Seipo E6"]),
    ("SE38", &["Mal Vorne Seat"]),
    ("EQ 5", &["SEIPO EQ 5"]),
    ("Seipo SE", &["SEIPO SE38"]),
    ("SEIPO SK", SEIPO_SK_FAMILIES),
    ("SEIPO VW", SEIPO_VW_FAMILIES),
    ("T-ROC", &["T-ROC"]),
    ("Renault", &["HHN"]),
];
const CT9_FAMILIES: &Families = &[("BMW", &["G6X"]), ("EQ 5", &["SEIPO EQ 5"])];
const DIRECTION_FAMILIES: &Families = &[
    ("AB3/Q2", &["AB3/Q2 Agrafage"]),
    ("C8", C8_FAMILIES),
    ("C-BEV", &["C-BEV"]),
    ("Crafter", &["Crafter"]),
    ("D5", &["D5 Low"]),
    ("Seipo", &["Seipo E6"]),
    ("BMW", &["G6X"]),
    ("SE38", &["Mal Vorne Seat"]),
    ("EQ 5", &["SEIPO EQ 5"]),
    ("Seipo SE", &["SEIPO SE38"]),
    ("SEIPO SK", SEIPO_SK_FAMILIES),
    ("SEIPO VW", SEIPO_VW_FAMILIES),
    ("T-ROC", &["T-ROC"]),
];
const MINUTES_PER_DAY: f64 = 1440.0;
const COMPLAINT_STATUS: [&str; 4] = ["Nouveau", "En cours", "Résolu", "Fermé"];

/// The set of tables the store knows how to persist.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableSchema>,
}

impl Catalog {
    #[cfg(test)]
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// Every table kept by the plant's input pages.
    pub fn standard() -> Self {
        let mut tables = vec![
            production(
                "ct1_ct4",
                "Production CT1/CT4",
                "CT1_CT4_data.xlsx",
                "Sheet1",
                CT1_CT4_FAMILIES,
                false,
            )
            .derive(Derivation::ratio("%", "Réaliser", &["Objecti Semaine"])),
            production("ct9", "Production CT9", "CT9_data.xlsx", "CT9", CT9_FAMILIES, true),
            quality_clients(),
            quality_suppliers(),
            line_stops(),
            supplier_follow_up(),
            direction(),
        ];
        tables.extend(HR_SECTIONS.iter().map(|section| hr_section(section)));
        tables.extend(MACHINES.iter().map(|machine| machine_follow_up(machine)));
        Self { tables }
    }

    pub fn get(&self, id: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.id == id)
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// The table persisted in `sheet` of the file named `file`, if any.
    pub fn find_location(&self, file: &str, sheet: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|table| table.file.eq_ignore_ascii_case(file) && table.sheet == sheet)
    }
}

/// CT9 counts are checked at entry, and its `%` is typed in rather than derived.
fn production(
    id: &str,
    title: &str,
    file: &str,
    sheet: &str,
    families: &Families,
    bounded: bool,
) -> TableSchema {
    let count = |name: &str| {
        let column = Column::number(name);
        if bounded { column.at_least(0.0) } else { column }
    };
    let percent = Column::percent("%", 2);

    let mut columns = vec![
        project_column(families),
        families_column(families),
        count("Rump up journalier"),
        count("Objecti Semaine"),
        count("Réaliser"),
        if bounded { percent.between(0.0, 100.0) } else { percent },
        Column::text("Commentaires"),
    ];
    columns.extend(WEEK_DAYS.iter().map(|day| count(day)));
    TableSchema::new(id, title, file, sheet, columns)
}

fn project_column(families: &Families) -> Column {
    let projects = families.iter().map(|(project, _)| *project).collect::<Vec<_>>();
    Column::text("Project").required().choices(&projects)
}

fn families_column(families: &Families) -> Column {
    Column::text("Familles").depends_on("Project", families)
}

fn quality_clients() -> TableSchema {
    TableSchema::new(
        "quality_clients",
        "Réclamations clients",
        "Reclamations_Clients.xlsx",
        "Sheet1",
        vec![
            Column::text("Clients").required(),
            Column::text("Projets").required(),
            Column::number("Semaine")
                .between(1.0, 53.0)
                .default_to(FieldDefault::CurrentIsoWeek),
            Column::date("Date").default_to(FieldDefault::Today),
            Column::text("Descriptions").required(),
            Column::text("Tri chez Le client").choices(&["Oui", "Non", "En cours"]),
            Column::text("Causes"),
            Column::text("Actions"),
            Column::text("Status").choices(&COMPLAINT_STATUS),
        ],
    )
}

fn quality_suppliers() -> TableSchema {
    TableSchema::new(
        "quality_suppliers",
        "Réclamations fournisseurs",
        "Reclamations_Fournisseurs.xlsx",
        "Sheet1",
        vec![
            Column::text("Fournisseurs").required(),
            Column::text("Références").required(),
            Column::number("Semaine")
                .between(1.0, 53.0)
                .default_to(FieldDefault::CurrentIsoWeek),
            Column::date("Date").default_to(FieldDefault::Today),
            Column::text("Descriptions").required(),
            Column::text("Trie").choices(&["Oui", "Non", "En attente"]),
            Column::text("Causes"),
            Column::text("Actions"),
            Column::text("Status").choices(&COMPLAINT_STATUS),
        ],
    )
}

fn line_stops() -> TableSchema {
    TableSchema::new(
        "logistics_line_stops",
        "Arrêts ligne",
        "Suivi_Arret_Ligne.xlsx",
        "Sheet1",
        vec![
            Column::date("DATE").default_to(FieldDefault::Today),
            Column::text("Département").required(),
            Column::text("Projet").required(),
            Column::text("Ligne").required(),
            Column::number("Nbr heures").at_least(0.0),
            Column::text("Composants").required(),
            Column::text("Cause").required(),
            Column::text("Actions"),
            Column::text("Status").choices(&["En cours", "Résolu", "En attente"]),
        ],
    )
}

fn supplier_follow_up() -> TableSchema {
    TableSchema::new(
        "logistics_suppliers",
        "Suivi fournisseurs",
        "Suivi_Fournisseur.xlsx",
        "Sheet1",
        vec![
            Column::text("Fournisseur").required(),
            Column::text("Status Fournisseur").choices(&["En règle", "En alerte", "En retard", "En litige"]),
            Column::text("Risque Arrêt").choices(&["Aucun", "Faible", "Moyen", "Élevé", "Arrêt en cours"]),
            Column::date("Date Arrêt").default_to(FieldDefault::Today),
            Column::text("Composants").required(),
            Column::text("Cause").required(),
            Column::text("Projet Impacté").required(),
        ],
    )
}

fn direction() -> TableSchema {
    let mut columns = vec![
        project_column(DIRECTION_FAMILIES),
        families_column(DIRECTION_FAMILIES),
        Column::number("Rump up journalier"),
        Column::number("Objecti Semaine"),
        Column::number("Réaliser"),
        Column::percent("%", 2),
    ];
    columns.extend(WEEK_DAYS.iter().map(|day| Column::number(day)));
    columns.extend([
        Column::number("Production"),
        Column::number("Operateurs Present"),
        Column::number("Operateurs Absent"),
        Column::percent("% Absent", 2),
        Column::number("Opérateurs Sortie"),
        Column::percent("% Sortie", 2),
        Column::number("Opérateurs Embauchés"),
        Column::percent("% Embauchés", 2),
    ]);

    let mut derivations = vec![
        Derivation::ratio("%", "Réaliser", &["Objecti Semaine"]),
        Derivation::ratio("% Absent", "Operateurs Absent", &["Operateurs Present", "Operateurs Absent"]),
        Derivation::ratio("% Sortie", "Opérateurs Sortie", &["Operateurs Present", "Operateurs Absent"]),
        Derivation::ratio(
            "% Embauchés",
            "Opérateurs Embauchés",
            &["Operateurs Present", "Operateurs Absent"],
        ),
    ];

    let mut opening = Vec::new();
    let mut stoppage = Vec::new();
    for day in WEEK_DAYS {
        let open = format!("Maintenance_{day}_Temps_Ouverture");
        let stop = format!("Maintenance_{day}_Arret_Machine");
        let available = format!("Maintenance_{day}_Disponibilite");
        columns.extend([
            Column::number(&open).at_least(0.0),
            Column::number(&stop).at_least(0.0),
            Column::percent(&available, 2),
        ]);
        derivations.push(Derivation::availability(&available, &open, &stop));
        opening.push(open);
        stoppage.push(stop);
    }

    columns.extend([
        Column::number("Maintenance_Total_Minutes_Ouverture"),
        Column::number("Maintenance_Total_Minutes_Arret"),
        Column::percent("Maintenance_Total_Disponibilite", 2),
        Column::number("Maintenance_Total_Heures_Ouverture"),
        Column::number("Maintenance_Total_Heures_Arret"),
        Column::percent("Maintenance_Total_Disponibilite_Pct", 2),
        Column::date("Visite_Date"),
        Column::text("Visite_Semaine"),
        Column::text("Visite_Motif"),
        Column::text("Visite_Qui"),
    ]);
    derivations.extend([
        Derivation::sum("Maintenance_Total_Minutes_Ouverture", &opening),
        Derivation::sum("Maintenance_Total_Minutes_Arret", &stoppage),
        Derivation::availability(
            "Maintenance_Total_Disponibilite",
            "Maintenance_Total_Minutes_Ouverture",
            "Maintenance_Total_Minutes_Arret",
        ),
        Derivation::scale(
            "Maintenance_Total_Heures_Ouverture",
            "Maintenance_Total_Minutes_Ouverture",
            1.0 / 60.0,
        ),
        Derivation::scale(
            "Maintenance_Total_Heures_Arret",
            "Maintenance_Total_Minutes_Arret",
            1.0 / 60.0,
        ),
        Derivation::availability(
            "Maintenance_Total_Disponibilite_Pct",
            "Maintenance_Total_Minutes_Ouverture",
            "Maintenance_Total_Minutes_Arret",
        ),
    ]);

    derivations.into_iter().fold(
        TableSchema::new("direction", "Direction", "Direction_data.xlsx", "Sheet1", columns),
        TableSchema::derive,
    )
}

fn hr_section(section: &str) -> TableSchema {
    let id = format!("hr_{}", section.to_lowercase().replace('-', "_"));
    let headcount = ["Operateurs Present", "Operateurs Absent"];

    TableSchema::new(
        &id,
        &format!("Effectifs {section}"),
        "Suivi_RH.xlsx",
        section,
        vec![
            Column::text("Jour"),
            Column::number("Operateurs Present").at_least(0.0),
            Column::number("Operateurs Absent").at_least(0.0),
            Column::percent("% Absent", 1),
            Column::number("Opérateurs Sortie").at_least(0.0),
            Column::percent("% Sortie", 1),
            Column::number("Opérateurs Embauchés").at_least(0.0),
            Column::percent("% Embauchés", 1),
            Column::text("Section"),
        ],
    )
    .derive(Derivation::ratio("% Absent", "Operateurs Absent", &headcount))
    .derive(Derivation::ratio("% Sortie", "Opérateurs Sortie", &headcount))
    .derive(Derivation::ratio("% Embauchés", "Opérateurs Embauchés", &headcount))
    .weekly(
        WeeklyLayout::new("Jour", vec![TotalRow::new("Total Semaine", 1.0)])
            .with_constant("Section", Value::text(section)),
    )
}

fn machine_follow_up(machine: &str) -> TableSchema {
    TableSchema::new(
        &format!("machine_{}", machine.to_lowercase()),
        &format!("Machine {machine}"),
        &format!("Suivi_{machine}.xlsx"),
        machine,
        vec![
            Column::text("Jour"),
            Column::number("Temps D'ouverture").between(0.0, MINUTES_PER_DAY),
            Column::number("Arrêt Machine (minutes)").between(0.0, MINUTES_PER_DAY),
            Column::percent("Disponibilité Machine", 1),
            Column::text("Interventions"),
        ],
    )
    .derive(Derivation::availability(
        "Disponibilité Machine",
        "Temps D'ouverture",
        "Arrêt Machine (minutes)",
    ))
    .weekly(
        WeeklyLayout::new(
            "Jour",
            vec![
                TotalRow::new("Total Minutes", 1.0),
                TotalRow::new("Total Heures", 1.0 / 60.0),
            ],
        )
        .with_default("Temps D'ouverture", Value::Number(MINUTES_PER_DAY)),
    )
}
