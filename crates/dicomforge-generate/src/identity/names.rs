use dicomforge_core::Sex;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::errors::{GenerationError, Result};

/// Longest accepted single name component.
pub const MAX_COMPONENT_LEN: usize = 31;

const MALE_FIRST_NAMES: &[&str] = &[
    "James", "John", "Robert", "Michael", "William", "David", "Richard", "Joseph", "Thomas",
    "Charles", "Christopher", "Daniel", "Matthew", "Anthony", "Mark", "Donald", "Steven", "Paul",
    "Andrew", "Joshua", "Kenneth", "Kevin", "Brian", "George", "Timothy", "Ronald", "Edward",
    "Jason", "Jeffrey", "Ryan", "Jacob", "Gary", "Nicholas", "Eric", "Jonathan", "Stephen",
    "Larry", "Justin", "Scott", "Brandon", "Benjamin", "Samuel", "Raymond", "Gregory", "Frank",
    "Alexander", "Patrick", "Jack", "Dennis", "Jerry", "Tyler", "Aaron", "Jose", "Adam",
    "Nathan", "Henry", "Douglas", "Zachary", "Peter", "Kyle", "Noah", "Ethan", "Jeremy",
    "Walter", "Christian", "Keith", "Roger", "Terry", "Austin", "Sean", "Gerald", "Carl",
    "Dylan", "Harold", "Jordan", "Jesse", "Bryan", "Lawrence", "Arthur", "Gabriel", "Bruce",
    "Albert", "Alan", "Wayne", "Ralph", "Eugene", "Russell", "Philip", "Louis", "Harry",
    "Vincent", "Logan", "Luke", "Caleb", "Evan", "Ian", "Connor", "Adrian", "Owen", "Jean",
    "Pierre", "Michel", "Andre", "Philippe", "Alain", "Bernard", "Jacques", "Francois",
    "Olivier", "Laurent", "Thierry", "Stephane", "Julien", "Christophe", "Pascal", "Sebastien",
    "Marc", "Antoine", "Maxime", "Lucas", "Hugo", "Raphael", "Jules", "Mathieu", "Romain",
    "Guillaume", "Benoit", "Cedric", "Fabien", "Yannick", "Herve", "Didier", "Gilles", "Bruno",
    "Claude", "Serge", "Frederic", "Emmanuel", "Arnaud", "Remi", "Damien", "Florian", "Quentin",
    "Jerome", "Xavier",
];

const FEMALE_FIRST_NAMES: &[&str] = &[
    "Mary", "Patricia", "Jennifer", "Linda", "Barbara", "Elizabeth", "Susan", "Jessica",
    "Sarah", "Karen", "Lisa", "Nancy", "Betty", "Margaret", "Sandra", "Ashley", "Kimberly",
    "Emily", "Donna", "Michelle", "Dorothy", "Carol", "Amanda", "Melissa", "Deborah",
    "Stephanie", "Rebecca", "Sharon", "Laura", "Cynthia", "Kathleen", "Amy", "Angela",
    "Shirley", "Anna", "Brenda", "Pamela", "Emma", "Nicole", "Helen", "Samantha", "Katherine",
    "Christine", "Debra", "Rachel", "Carolyn", "Janet", "Catherine", "Maria", "Heather",
    "Diane", "Ruth", "Julie", "Olivia", "Joyce", "Virginia", "Victoria", "Kelly", "Lauren",
    "Christina", "Joan", "Evelyn", "Judith", "Megan", "Andrea", "Cheryl", "Hannah",
    "Jacqueline", "Martha", "Gloria", "Teresa", "Ann", "Sara", "Madison", "Frances", "Kathryn",
    "Janice", "Abigail", "Alice", "Julia", "Sophia", "Grace", "Denise", "Amber", "Doris",
    "Marilyn", "Danielle", "Beverly", "Isabella", "Theresa", "Diana", "Natalie", "Charlotte",
    "Marie", "Kayla", "Alexis", "Chloe", "Ava", "Mia", "Ella", "Lily", "Zoe", "Audrey", "Hazel",
    "Violet", "Aurora", "Nathalie", "Isabelle", "Sylvie", "Francoise", "Valerie", "Monique",
    "Sophie", "Martine", "Sandrine", "Celine", "Aurelie", "Caroline", "Laurence", "Emilie",
    "Claire", "Anne", "Camille", "Manon", "Lea", "Lucie", "Juliette", "Louise", "Helene",
    "Delphine", "Brigitte", "Veronique", "Corinne", "Mireille", "Odile", "Elise", "Margaux",
    "Pauline", "Marine", "Morgane", "Anais", "Oceane", "Ines", "Elodie", "Mathilde", "Clemence",
    "Justine", "Agathe", "Estelle", "Noemie",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White", "Harris", "Sanchez",
    "Clark", "Ramirez", "Lewis", "Robinson", "Walker", "Young", "Allen", "King", "Wright",
    "Scott", "Torres", "Nguyen", "Hill", "Flores", "Green", "Adams", "Nelson", "Baker", "Hall",
    "Rivera", "Campbell", "Mitchell", "Carter", "Roberts", "Gomez", "Phillips", "Evans",
    "Turner", "Diaz", "Parker", "Cruz", "Edwards", "Collins", "Reyes", "Stewart", "Morris",
    "Morales", "Murphy", "Cook", "Rogers", "Gutierrez", "Ortiz", "Morgan", "Cooper", "Peterson",
    "Bailey", "Reed", "Kelly", "Howard", "Ramos", "Kim", "Cox", "Ward", "Richardson", "Watson",
    "Brooks", "Chavez", "Wood", "Bennett", "Gray", "Mendoza", "Ruiz", "Hughes", "Price",
    "Alvarez", "Castillo", "Sanders", "Patel", "Myers", "Long", "Ross", "Foster", "Jimenez",
    "Powell", "Jenkins", "Perry", "Russell", "Sullivan", "Bell", "Coleman", "Butler",
    "Henderson", "Barnes", "Fisher", "Vasquez", "Simmons", "Graham", "Reynolds", "Hamilton",
    "Griffin", "Wallace", "West", "Cole", "Hayes", "Bryant", "Herrera", "Gibson", "Ellis",
    "Tran", "Bernard", "Dubois", "Robert", "Richard", "Petit", "Durand", "Leroy", "Moreau",
    "Simon", "Laurent", "Lefebvre", "Michel", "David", "Bertrand", "Roux", "Vincent",
    "Fournier", "Morel", "Girard", "Andre", "Mercier", "Dupont", "Lambert", "Bonnet",
    "Francois", "Legrand", "Garnier", "Faure", "Rousseau", "Blanc", "Guerin", "Muller", "Henry",
    "Roussel", "Nicolas", "Perrin", "Morin", "Mathieu", "Clement", "Gauthier", "Dumont",
    "Fontaine", "Chevalier", "Robin", "Masson", "Gerard", "Boyer", "Denis", "Lemaire", "Dufour",
    "Renaud", "Barbier", "Arnaud", "Marchand", "Picard", "Leclerc", "Giraud", "Brun",
    "Gaillard", "Renard", "Roy", "Noel", "Meyer", "Hubert", "Gautier",
];

/// Candidate tables for patient names.
///
/// First names are partitioned by sex; last names are shared. Every entry is
/// printable ASCII without the `^` and `\` delimiters, so a joined name is a
/// valid single-group person name under the default character repertoire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCatalog {
    male_first: Vec<String>,
    female_first: Vec<String>,
    last: Vec<String>,
}

impl Default for NameCatalog {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        Self {
            male_first: owned(MALE_FIRST_NAMES),
            female_first: owned(FEMALE_FIRST_NAMES),
            last: owned(LAST_NAMES),
        }
    }
}

impl NameCatalog {
    pub fn new(
        male_first: Vec<String>,
        female_first: Vec<String>,
        last: Vec<String>,
    ) -> Result<Self> {
        for (table, names) in [
            ("male first names", &male_first),
            ("female first names", &female_first),
            ("last names", &last),
        ] {
            if names.is_empty() {
                return Err(GenerationError::InvalidCatalog(format!("{table} are empty")));
            }
            if let Some(bad) = names.iter().find(|name| !is_valid_component(name)) {
                return Err(GenerationError::InvalidCatalog(format!(
                    "{table}: '{bad}' must be 1-{MAX_COMPONENT_LEN} printable ASCII characters \
                     without '^' or '\\'"
                )));
            }
        }
        Ok(Self {
            male_first,
            female_first,
            last,
        })
    }

    /// `LASTNAME^FIRSTNAME` drawn from `rng`; a pure function of its state.
    pub fn patient_name<R: Rng + ?Sized>(&self, sex: Sex, rng: &mut R) -> String {
        let first = match sex {
            Sex::Male => &self.male_first,
            Sex::Female => &self.female_first,
        };
        let first = first.choose(rng).map(String::as_str).unwrap_or_default();
        let last = self.last.choose(rng).map(String::as_str).unwrap_or_default();
        format!("{last}^{first}")
    }

    /// Same as [`NameCatalog::patient_name`] on the thread-local default source.
    ///
    /// `sex_code` is `"M"` for male; anything else selects female names.
    pub fn random_patient_name(&self, sex_code: &str) -> String {
        self.patient_name(Sex::from_code(sex_code), &mut rand::rng())
    }

    /// Length of the longest name this catalog can produce.
    pub fn longest_name_len(&self) -> usize {
        let longest = |names: &[String]| names.iter().map(String::len).max().unwrap_or(0);
        longest(&self.last) + 1 + longest(&self.male_first).max(longest(&self.female_first))
    }

    pub fn first_names(&self, sex: Sex) -> &[String] {
        match sex {
            Sex::Male => &self.male_first,
            Sex::Female => &self.female_first,
        }
    }

    pub fn last_names(&self) -> &[String] {
        &self.last
    }
}

fn is_valid_component(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_COMPONENT_LEN
        && name
            .chars()
            .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '^' && c != '\\')
}
