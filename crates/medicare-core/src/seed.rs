//! Demo data for local development.
//!
//! Mirrors the data a fresh install is expected to show: three patients,
//! three Mumbai hospitals with five doctors, a week of half-hour slots, one
//! diagnostics lab and one pharmacy.

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::info;

use crate::db::{insert_medicine_with_opening_stock, Database, DbResult};
use crate::models::{Clinic, Doctor, DoctorSlot, LabTest, Laboratory, Medicine, Pharmacy, User, DATE_FORMAT};

/// Days of slots generated per doctor, starting today.
pub const SLOT_DAYS: i64 = 7;

/// Session windows; each is cut into 30 minute slots.
const SESSIONS: [(u32, u32); 2] = [(9, 12), (14, 17)];

/// Tables in child-before-parent order.
const CLEAR_ORDER: &[&str] = &[
    "order_items",
    "orders",
    "stock_entries",
    "medicines",
    "pharmacies",
    "lab_bookings",
    "lab_tests",
    "laboratories",
    "uploaded_files",
    "prescriptions",
    "appointments",
    "doctor_slots",
    "doctor_specialties",
    "doctors",
    "emergency_requests",
    "clinics",
    "notifications",
    "audit_logs",
    "notification_preferences",
    "addresses",
    "family_members",
    "users",
];

/// Row counts written by [`Seeder::seed_demo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub clinics: usize,
    pub doctors: usize,
    pub slots: usize,
    pub laboratories: usize,
    pub lab_tests: usize,
    pub pharmacies: usize,
    pub medicines: usize,
}

pub struct Seeder<'a> {
    db: &'a Database,
}

impl<'a> Seeder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Delete every row, keeping the schema and migration ledger.
    pub fn clear_all(&self) -> DbResult<()> {
        let tx = self.db.begin()?;
        for table in CLEAR_ORDER {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        tx.commit()?;
        info!(tables = CLEAR_ORDER.len(), "cleared all data");
        Ok(())
    }

    /// Insert the demo data set in one transaction.
    pub fn seed_demo(&self, today: NaiveDate) -> DbResult<SeedSummary> {
        let tx = self.db.begin()?;
        let mut summary = SeedSummary::default();

        for mut user in demo_users() {
            self.db.insert_user(&mut user)?;
            summary.users += 1;
        }

        for clinic in demo_clinics() {
            self.db.insert_clinic(&clinic)?;
            summary.clinics += 1;
        }

        for mut doctor in demo_doctors() {
            self.db.insert_doctor(&mut doctor)?;
            summary.doctors += 1;
            summary.slots += self.seed_slots(doctor.id, today)?;
        }

        let lab = demo_laboratory();
        self.db.insert_laboratory(&lab)?;
        summary.laboratories += 1;
        for mut test in demo_lab_tests(&lab.id) {
            self.db.insert_lab_test(&mut test)?;
            summary.lab_tests += 1;
        }

        let mut pharmacy = demo_pharmacy();
        self.db.insert_pharmacy(&mut pharmacy)?;
        summary.pharmacies += 1;
        for mut medicine in demo_medicines(pharmacy.id, today) {
            insert_medicine_with_opening_stock(&tx, &mut medicine)?;
            summary.medicines += 1;
        }

        tx.commit()?;
        info!(?summary, "seeded demo data");
        Ok(summary)
    }

    fn seed_slots(&self, doctor_id: i64, today: NaiveDate) -> DbResult<usize> {
        let mut count = 0;
        for offset in 0..SLOT_DAYS {
            let date = (today + Duration::days(offset)).format(DATE_FORMAT).to_string();
            for (start, end) in half_hour_slots() {
                let mut slot = DoctorSlot::new(doctor_id, date.clone(), start, end);
                self.db.insert_slot(&mut slot)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// `(start, end)` pairs as `HH:MM`, 12 per day.
fn half_hour_slots() -> Vec<(String, String)> {
    let mut slots = Vec::new();
    for (from, to) in SESSIONS {
        for hour in from..to {
            for minute in [0, 30] {
                let Some(start) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                    continue;
                };
                let end = start + Duration::minutes(30);
                slots.push((start.format("%H:%M").to_string(), end.format("%H:%M").to_string()));
            }
        }
    }
    slots
}

fn demo_users() -> Vec<User> {
    let mut rahul = User::new("+919876543210").with_name("Rahul Kumar");
    rahul.gender = Some("male".into());
    rahul.blood_group = Some("O+".into());
    rahul.location_lat = Some(19.1136);
    rahul.location_lng = Some(72.8697);
    rahul.insurance_provider = Some("ICICI Lombard".into());
    rahul.is_verified = true;

    let mut priya = User::new("+919876543211").with_name("Priya Sharma");
    priya.gender = Some("female".into());
    priya.blood_group = Some("A+".into());
    priya.location_lat = Some(19.0760);
    priya.location_lng = Some(72.8777);
    priya.insurance_provider = Some("Star Health".into());
    priya.is_verified = true;

    let mut ankit = User::new("+919876543212").with_name("Ankit Patel");
    ankit.gender = Some("male".into());
    ankit.blood_group = Some("B+".into());
    ankit.is_verified = true;

    vec![rahul, priya, ankit]
}

fn demo_clinics() -> Vec<Clinic> {
    let specs = [
        (
            "CLI001",
            "Apollo Hospital",
            "123 Main Road, Andheri West, Mumbai - 400058",
            19.1197,
            72.8464,
            "+91-22-26735000",
            &["ICICI Lombard", "Star Health", "Max Bupa"][..],
            4.5,
            230,
        ),
        (
            "CLI002",
            "Fortis Hospital",
            "Bandra, Mumbai - 400050",
            19.0596,
            72.8295,
            "+91-22-66754444",
            &["Max Bupa", "Cigna"][..],
            4.6,
            180,
        ),
        (
            "CLI003",
            "Lilavati Hospital",
            "Bandra West, Mumbai - 400050",
            19.0544,
            72.8185,
            "+91-22-26567891",
            &["ICICI Lombard", "Star Health"][..],
            4.7,
            340,
        ),
    ];

    specs
        .into_iter()
        .map(|(id, name, address, lat, lng, phone, insurers, rating, reviews)| {
            let mut clinic = Clinic::new(id, name, address, lat, lng);
            clinic.phone = Some(phone.into());
            clinic.emergency_available = true;
            clinic.ambulance_available = true;
            clinic.insurance_accepted = insurers.iter().map(|s| s.to_string()).collect();
            clinic.rating = rating;
            clinic.total_reviews = reviews;
            clinic
        })
        .collect()
}

fn demo_doctors() -> Vec<Doctor> {
    let specs = [
        ("CLI001", "Dr. Rajesh Sharma", &["Orthopedic", "Sports Medicine"][..], "MBBS, MS (Ortho)", 15, 800, 4.8, 230),
        ("CLI001", "Dr. Meera Reddy", &["Cardiologist"][..], "MBBS, MD (Cardio)", 20, 1200, 4.9, 340),
        ("CLI002", "Dr. Amit Desai", &["General Physician"][..], "MBBS, MD", 10, 500, 4.5, 180),
        ("CLI002", "Dr. Priya Mehta", &["Orthopedic"][..], "MBBS, MS (Ortho)", 12, 700, 4.6, 200),
        ("CLI003", "Dr. Vikram Singh", &["Cardiologist"][..], "MBBS, DM (Cardio)", 25, 1500, 4.9, 450),
    ];

    specs
        .into_iter()
        .map(|(clinic_id, name, specialties, qualification, years, fee, rating, consultations)| {
            let specialties = specialties.iter().map(|s| s.to_string()).collect();
            let mut doctor = Doctor::new(name, specialties, fee);
            doctor.clinic_id = Some(clinic_id.into());
            doctor.qualification = Some(qualification.into());
            doctor.experience_years = years;
            doctor.rating = rating;
            doctor.total_consultations = consultations;
            doctor.is_verified = true;
            doctor
        })
        .collect()
}

fn demo_laboratory() -> Laboratory {
    let mut lab = Laboratory::new(
        "LAB001",
        "HealthFirst Diagnostics",
        "Andheri East, Mumbai - 400069",
        "Dr. Sunil Kapoor",
    );
    lab.city = Some("Mumbai".into());
    lab.state = Some("Maharashtra".into());
    lab.accreditation = vec!["NABL".into()];
    lab.is_verified = true;
    lab
}

fn demo_lab_tests(lab_id: &str) -> Vec<LabTest> {
    let specs = [
        ("Complete Blood Count (CBC)", "Measures different components of blood", 300, 6, false),
        ("Lipid Profile", "Checks cholesterol levels", 600, 12, true),
        ("Thyroid Panel (T3, T4, TSH)", "Checks thyroid function", 500, 24, false),
        ("Vitamin D Test", "Measures Vitamin D levels", 800, 48, false),
        ("HbA1c (Diabetes)", "3-month average blood sugar", 400, 12, true),
    ];

    specs
        .into_iter()
        .map(|(name, description, price, hours, fasting)| {
            let mut test = LabTest::new(lab_id, name, price, hours);
            test.category = Some("blood_test".into());
            test.description = Some(description.into());
            test.sample_type = Some("blood".into());
            test.fasting_required = fasting;
            test
        })
        .collect()
}

fn demo_pharmacy() -> Pharmacy {
    let mut pharmacy = Pharmacy::new(
        "PHR001",
        "MedPlus Pharmacy",
        "MH-MUM-DL-20451",
        "Sanjay Gupta",
        "Linking Road, Bandra West, Mumbai - 400050",
    );
    pharmacy.city = Some("Mumbai".into());
    pharmacy.state = Some("Maharashtra".into());
    pharmacy.is_verified = true;
    pharmacy
}

fn demo_medicines(pharmacy_id: i64, today: NaiveDate) -> Vec<Medicine> {
    let expiry = (today + Duration::days(730)).format(DATE_FORMAT).to_string();
    let specs = [
        ("Paracetamol 500mg", "Acetaminophen", "Pain Relief", "500mg", "Cipla", 20, 500, false),
        ("Amoxicillin 250mg", "Amoxicillin", "Antibiotic", "250mg", "Sun Pharma", 120, 200, true),
        ("Cetirizine 10mg", "Cetirizine", "Allergy", "10mg", "Dr. Reddy's", 40, 300, false),
        ("Omeprazole 20mg", "Omeprazole", "Antacid", "20mg", "Lupin", 80, 150, false),
    ];

    specs
        .into_iter()
        .enumerate()
        .map(|(i, (name, generic, category, dosage, manufacturer, price, stock, rx))| {
            let mut medicine = Medicine::new(
                pharmacy_id,
                name,
                price,
                price,
                expiry.clone(),
                format!("DEMO{:03}", i + 1),
            );
            medicine.generic_name = Some(generic.into());
            medicine.category = Some(category.into());
            medicine.dosage = Some(dosage.into());
            medicine.manufacturer = Some(manufacturer.into());
            medicine.stock_quantity = stock;
            medicine.requires_prescription = rx;
            medicine
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_half_hour_slots() {
        let slots = half_hour_slots();
        assert_eq!(slots.len(), 12);
        assert_eq!(slots[0], ("09:00".to_string(), "09:30".to_string()));
        assert_eq!(slots[5], ("11:30".to_string(), "12:00".to_string()));
        assert_eq!(slots[6], ("14:00".to_string(), "14:30".to_string()));
        assert_eq!(slots[11], ("16:30".to_string(), "17:00".to_string()));
    }

    #[test]
    fn test_seed_demo_counts() {
        let db = Database::open_in_memory().unwrap();
        let summary = Seeder::new(&db).seed_demo(today()).unwrap();

        assert_eq!(
            summary,
            SeedSummary {
                users: 3,
                clinics: 3,
                doctors: 5,
                slots: 5 * 7 * 12,
                laboratories: 1,
                lab_tests: 5,
                pharmacies: 1,
                medicines: 4,
            }
        );
        assert_eq!(count(&db, "doctor_slots"), 420);
        assert_eq!(count(&db, "stock_entries"), 4);
    }

    #[test]
    fn test_seeded_data_is_usable() {
        let db = Database::open_in_memory().unwrap();
        Seeder::new(&db).seed_demo(today()).unwrap();

        let cardiologists = db.find_doctors_by_specialty("cardiologist").unwrap();
        assert_eq!(cardiologists.len(), 2);

        let paracetamol = db.search_medicines("paracetamol", 10).unwrap();
        assert_eq!(paracetamol.len(), 1);
        assert_eq!(paracetamol[0].stock_quantity, 500);

        let user = db.get_user_by_phone("+919876543211").unwrap().unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Priya Sharma"));
        assert!(user.is_verified);
    }

    #[test]
    fn test_second_seed_conflicts_and_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let seeder = Seeder::new(&db);
        seeder.seed_demo(today()).unwrap();

        assert!(seeder.seed_demo(today()).is_err());
        assert_eq!(count(&db, "users"), 3);
    }

    #[test]
    fn test_clear_then_reseed() {
        let db = Database::open_in_memory().unwrap();
        let seeder = Seeder::new(&db);
        seeder.seed_demo(today()).unwrap();

        seeder.clear_all().unwrap();
        for table in CLEAR_ORDER {
            assert_eq!(count(&db, table), 0, "{} should be empty", table);
        }
        assert!(count(&db, "schema_migrations") > 0);

        let summary = seeder.seed_demo(today()).unwrap();
        assert_eq!(summary.doctors, 5);
    }
}
